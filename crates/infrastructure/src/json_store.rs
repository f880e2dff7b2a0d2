//! JSON 平面文件存储
//!
//! 整个文件就是一个 `{ key: record }` 对象。读取时整表反序列化，写入时整表序列化到
//! 同目录的临时文件再改名覆盖，进程中途退出也不会留下写了一半的文件。

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use application::{ApplicationError, LedgerStore};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tracing::{debug, error};

pub struct JsonFileStore<V> {
    path: PathBuf,
    _records: PhantomData<fn() -> V>,
}

impl<V> JsonFileStore<V> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _records: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl<V> LedgerStore<V> for JsonFileStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn load(&self) -> Result<HashMap<String, V>, ApplicationError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "数据文件不存在，按空表处理");
                return Ok(HashMap::new());
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "读取数据文件失败");
                return Err(ApplicationError::persistence(format!(
                    "读取 {} 失败: {e}",
                    self.path.display()
                )));
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(HashMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "数据文件格式错误");
            ApplicationError::persistence(format!("解析 {} 失败: {e}", self.path.display()))
        })
    }

    async fn save(&self, records: &HashMap<String, V>) -> Result<(), ApplicationError> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| ApplicationError::persistence(format!("序列化失败: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!(path = %parent.display(), error = %e, "创建数据目录失败");
                ApplicationError::persistence(format!("创建目录 {} 失败: {e}", parent.display()))
            })?;
        }

        let temp = self.temp_path();
        let write = async {
            fs::write(&temp, &bytes).await?;
            fs::rename(&temp, &self.path).await
        };
        write.await.map_err(|e| {
            error!(path = %self.path.display(), error = %e, "写入数据文件失败");
            ApplicationError::persistence(format!("写入 {} 失败: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), records = records.len(), "数据已写回");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{RewardAccount, RewardKey};

    fn account(key: &str, points: u64) -> RewardAccount {
        let mut account = RewardAccount::new(RewardKey::parse(key).unwrap(), Utc::now());
        account.points = points;
        account
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty_and_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::<RewardAccount>::new(dir.path().join("nested/points.json"));
        assert!(store.load().await.unwrap().is_empty());

        let mut records = HashMap::new();
        records.insert("r1".to_owned(), account("r1", 42));
        store.save(&records).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded["r1"].points, 42);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn file_uses_core_id_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json");
        let store = JsonFileStore::<RewardAccount>::new(&path);
        let mut records = HashMap::new();
        records.insert("r1".to_owned(), account("r1", 7));
        store.save(&records).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["r1"]["coreId"], "r1");
        assert_eq!(raw["r1"]["points"], 7);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_an_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = JsonFileStore::<RewardAccount>::new(&path);

        let err = store.load().await.unwrap_err();
        assert_eq!(err.reason_code(), "external_dependency_error");
    }

    #[tokio::test]
    async fn blank_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json");
        std::fs::write(&path, b"\n").unwrap();
        let store = JsonFileStore::<RewardAccount>::new(&path);
        assert!(store.load().await.unwrap().is_empty());
    }
}
