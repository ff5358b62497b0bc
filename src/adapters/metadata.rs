use crate::adapters::command::{run_command, CommandSpec};
use crate::domain::model::{ModelMetadata, ModelRecord};
use crate::domain::ports::MetadataProvider;
use crate::utils::error::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::Mutex;

static LEGACY_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(TB|GB|MB|T|G|M)?\s*$").expect("valid size pattern")
});

/// 模型大小（GB）的磁碟字典，鍵為模型完整名稱
#[derive(Debug, Clone, Default)]
pub struct ModelSizeStore {
    path: PathBuf,
    entries: BTreeMap<String, f64>,
}

impl ModelSizeStore {
    /// 檔案不存在或格式錯誤時回傳空字典
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Self::parse_entries(&content).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Ignoring unreadable size store {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("⚠️ Could not read size store {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        tracing::debug!("Loaded {} model sizes from {}", entries.len(), path.display());
        Self { path, entries }
    }

    /// 舊版字串值（如 "16.40 GB"）會轉為數值，無法解析的項目丟棄
    pub fn parse_entries(content: &str) -> Result<BTreeMap<String, f64>> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(content)?;
        Ok(raw
            .into_iter()
            .filter_map(|(name, value)| normalize_size(&value).map(|size| (name, size)))
            .collect())
    }

    pub fn get(&self, model_name: &str) -> Option<f64> {
        self.entries.get(model_name).copied()
    }

    pub fn insert(&mut self, model_name: impl Into<String>, size_gb: f64) {
        self.entries.insert(model_name.into(), size_gb);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

pub fn normalize_size(value: &serde_json::Value) -> Option<f64> {
    let size = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => {
            let caps = LEGACY_SIZE_RE.captures(s)?;
            let amount = caps[1].parse::<f64>().ok()?;
            match caps.get(2).map(|m| m.as_str().to_uppercase()).as_deref() {
                Some("TB") | Some("T") => amount * 1024.0,
                Some("MB") | Some("M") => amount / 1024.0,
                _ => amount,
            }
        }
        _ => return None,
    };
    size.is_finite().then_some(size)
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    chute_id: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyEntry {
    hotkey: Option<String>,
    coldkey: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SizeEntry {
    #[serde(rename = "modelSizeGB")]
    model_size_gb: Option<f64>,
}

/// 解析 `{ "<uid>": {...} }` 形式的批次輸出
fn parse_uid_batch<T: DeserializeOwned>(output: &str) -> Result<BTreeMap<u32, T>> {
    let raw: BTreeMap<String, T> = serde_json::from_str(output.trim())?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| key.parse::<u32>().ok().map(|uid| (uid, value)))
        .collect())
}

/// 透過外部批次指令查詢 commit、金鑰與模型大小
pub struct CommandMetadataProvider {
    commits: Option<CommandSpec>,
    keys: Option<CommandSpec>,
    sizes: Option<CommandSpec>,
    size_store: Option<Mutex<ModelSizeStore>>,
    timeout: Duration,
}

impl CommandMetadataProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            commits: None,
            keys: None,
            sizes: None,
            size_store: None,
            timeout,
        }
    }

    pub fn with_commits(mut self, spec: CommandSpec) -> Self {
        self.commits = Some(spec);
        self
    }

    pub fn with_keys(mut self, spec: CommandSpec) -> Self {
        self.keys = Some(spec);
        self
    }

    pub fn with_sizes(mut self, spec: CommandSpec) -> Self {
        self.sizes = Some(spec);
        self
    }

    pub fn with_size_store(mut self, store: ModelSizeStore) -> Self {
        self.size_store = Some(Mutex::new(store));
        self
    }

    pub fn is_configured(&self) -> bool {
        self.commits.is_some() || self.keys.is_some() || self.size_store.is_some()
    }

    async fn run_batch<T: DeserializeOwned>(
        &self,
        spec: &CommandSpec,
        uids: &[String],
    ) -> Result<BTreeMap<u32, T>> {
        let output = run_command(spec, uids, self.timeout).await?;
        parse_uid_batch(&output)
    }

    async fn fill_sizes(&self, models: &[ModelRecord], result: &mut BTreeMap<u32, ModelMetadata>) {
        let Some(store) = &self.size_store else {
            return;
        };
        let mut store = store.lock().await;

        let names: Vec<(u32, String)> = models
            .iter()
            .map(|m| {
                let full_name = result
                    .get(&m.uid)
                    .and_then(|meta| meta.model_full_name.clone())
                    .unwrap_or_else(|| m.model_name.clone());
                (m.uid, full_name)
            })
            .filter(|(_, name)| !name.is_empty())
            .collect();

        let mut missing: Vec<String> = names
            .iter()
            .filter(|(_, name)| store.get(name).is_none())
            .map(|(_, name)| name.clone())
            .collect();
        missing.sort();
        missing.dedup();

        if let (Some(spec), false) = (&self.sizes, missing.is_empty()) {
            let mut args = vec!["--model".to_string()];
            args.extend(missing.iter().cloned());

            match run_command(spec, &args, self.timeout).await.and_then(|out| {
                let raw: BTreeMap<String, SizeEntry> = serde_json::from_str(out.trim())?;
                Ok(raw)
            }) {
                Ok(sizes) => {
                    let mut updated = 0usize;
                    for (name, entry) in sizes {
                        if let Some(size) = entry.model_size_gb.filter(|s| s.is_finite()) {
                            store.insert(name, size);
                            updated += 1;
                        }
                    }
                    if updated > 0 {
                        if let Err(e) = store.save().await {
                            tracing::warn!("⚠️ Could not persist model sizes: {}", e);
                        }
                    }
                }
                Err(e) => tracing::warn!("⚠️ Model size lookup failed: {}", e),
            }
        }

        for (uid, name) in names {
            if let Some(size) = store.get(&name) {
                result.entry(uid).or_default().model_size_gb = Some(size);
            }
        }
    }
}

#[async_trait]
impl MetadataProvider for CommandMetadataProvider {
    async fn lookup(&self, models: &[ModelRecord]) -> Result<BTreeMap<u32, ModelMetadata>> {
        let uids: Vec<String> = models.iter().map(|m| m.uid.to_string()).collect();
        let mut result: BTreeMap<u32, ModelMetadata> = BTreeMap::new();

        if uids.is_empty() {
            return Ok(result);
        }

        // 各來源獨立失敗，失敗時只略過該來源
        if let Some(spec) = &self.commits {
            match self.run_batch::<CommitEntry>(spec, &uids).await {
                Ok(entries) => {
                    for (uid, entry) in entries {
                        let meta = result.entry(uid).or_default();
                        meta.chute_id = entry.chute_id;
                        meta.model_full_name = entry.model;
                    }
                }
                Err(e) => tracing::warn!("⚠️ Commit lookup failed: {}", e),
            }
        }

        if let Some(spec) = &self.keys {
            match self.run_batch::<KeyEntry>(spec, &uids).await {
                Ok(entries) => {
                    for (uid, entry) in entries {
                        let meta = result.entry(uid).or_default();
                        meta.hotkey = entry.hotkey;
                        meta.coldkey = entry.coldkey;
                    }
                }
                Err(e) => tracing::warn!("⚠️ Key lookup failed: {}", e),
            }
        }

        self.fill_sizes(models, &mut result).await;

        tracing::debug!("Collected metadata for {} uids", result.len());
        Ok(result)
    }
}
