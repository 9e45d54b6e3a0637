use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::document::{Document, MetadataValue};
use crate::parser::markdown_to_text;

/// Something documents can be loaded from
#[async_trait]
pub trait DataSource {
    async fn load(&self) -> Result<Vec<Document>>;
}

/// Pick a source for a CLI argument: http(s) URLs are fetched, anything else
/// is a local path
pub fn source_for(location: &str) -> Result<Box<dyn DataSource + Send + Sync>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Box::new(UrlSource::new(location)?))
    } else {
        Ok(Box::new(LocalSource::new(location)))
    }
}

/// One entry of a JSON corpus file
#[derive(Debug, Deserialize)]
struct SourceRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(alias = "text")]
    content: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl SourceRecord {
    fn into_document(self) -> Document {
        let id = match self.id {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let mut document = match id {
            Some(id) => Document::new(id, self.content),
            None => Document::from_text(self.content),
        };
        document.source_metadata = self
            .extra
            .iter()
            .filter_map(|(key, value)| MetadataValue::from_json(value).map(|v| (key.clone(), v)))
            .collect();
        document
    }
}

/// Parse a JSON corpus: either an array of records or `{"documents": [...]}`.
/// Records without text are skipped.
pub fn parse_records(json: &str) -> Result<Vec<Document>> {
    let value: Value = serde_json::from_str(json).context("corpus is not valid JSON")?;
    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut object) => match object.remove("documents") {
            Some(Value::Array(records)) => records,
            _ => bail!("expected an array of records or an object with a \"documents\" array"),
        },
        _ => bail!("expected an array of records or an object with a \"documents\" array"),
    };

    let mut documents = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<SourceRecord>(record) {
            Ok(record) => documents.push(record.into_document()),
            Err(e) => warn!(position, error = %e, "skipping malformed record"),
        }
    }
    Ok(documents)
}

fn is_supported_file(path: &Path) -> bool {
    matches!(
        extension(path).as_deref(),
        Some("json" | "md" | "markdown" | "txt")
    )
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Turn file content into documents according to its extension
fn documents_from_content(id: &str, path: &Path, content: &str) -> Result<Vec<Document>> {
    let metadata = |document: Document| {
        document.with_metadata("source", path.display().to_string())
    };

    match extension(path).as_deref() {
        Some("json") => {
            parse_records(content).with_context(|| format!("failed to parse {}", path.display()))
        }
        Some("md" | "markdown") => Ok(vec![metadata(Document::new(id, markdown_to_text(content)))]),
        _ => Ok(vec![metadata(Document::new(id, content))]),
    }
}

pub struct LocalSource {
    path: PathBuf,
}

impl LocalSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }

    fn load_file(&self, file: &Path, id: &str) -> Result<Vec<Document>> {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        documents_from_content(id, file, &content)
    }
}

#[async_trait]
impl DataSource for LocalSource {
    async fn load(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        if self.path.is_file() {
            let id = self
                .path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("Invalid filename: {}", self.path.display()))?;
            documents.extend(self.load_file(&self.path, id)?);
        } else if self.path.is_dir() {
            let walker = WalkDir::new(&self.path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok());
            for entry in walker {
                if !entry.file_type().is_file() || !is_supported_file(entry.path()) {
                    continue;
                }
                let relative_path = entry.path().strip_prefix(&self.path)?;
                let id = relative_path.to_string_lossy().replace('\\', "/");
                debug!(file = %entry.path().display(), "loading file");
                documents.extend(self.load_file(entry.path(), &id)?);
            }
        } else {
            bail!("{} is neither a file nor a directory", self.path.display());
        }

        info!(path = %self.path.display(), documents = documents.len(), "loaded local documents");
        Ok(documents)
    }
}

pub struct UrlSource {
    url: Url,
}

impl UrlSource {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            url: Url::parse(url).with_context(|| format!("invalid URL: {}", url))?,
        })
    }
}

#[async_trait]
impl DataSource for UrlSource {
    async fn load(&self) -> Result<Vec<Document>> {
        let client = Client::new();
        let response = client
            .get(self.url.as_str())
            .header("User-Agent", "knowledge-graph-builder")
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", self.url))?;

        if !response.status().is_success() {
            bail!("failed to fetch {}: {}", self.url, response.status());
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("json"))
            .unwrap_or(false);
        let content = response.text().await?;

        let filename = self
            .url
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("downloaded_content.txt");
        let path = if is_json && extension(Path::new(filename)).is_none() {
            PathBuf::from(format!("{}.json", filename))
        } else {
            PathBuf::from(filename)
        };

        let mut documents = documents_from_content(self.url.as_str(), &path, &content)?;
        for document in &mut documents {
            document
                .source_metadata
                .entry("url".to_string())
                .or_insert_with(|| MetadataValue::from(self.url.as_str()));
        }

        info!(url = %self.url, documents = documents.len(), "loaded remote documents");
        Ok(documents)
    }
}
