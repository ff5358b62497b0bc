use crate::domain::model::{DominanceSnapshot, ModelMetadata, ModelRecord, RawReport};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn output_path(&self) -> &str;
    fn output_formats(&self) -> &[String];
    /// 覆寫報表中的環境清單；空值代表使用報表標頭
    fn environments(&self) -> &[String];
    /// 設定時將所有輸出打包為 ZIP
    fn bundle_filename(&self) -> Option<&str>;
}

/// 排名報表文字的來源
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch(&self) -> Result<RawReport>;
    fn describe(&self) -> String;
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn lookup(&self, models: &[ModelRecord]) -> Result<BTreeMap<u32, ModelMetadata>>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<RawReport>;
    async fn transform(&self, report: RawReport) -> Result<DominanceSnapshot>;
    async fn load(&self, snapshot: &DominanceSnapshot) -> Result<String>;
}
