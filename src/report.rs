//! Saving and sharing downloaded reports

use crate::api::{ReportDocument, SessionId};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

/// Where a report ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDelivery {
    Saved { location: String },
    Shared { location: String },
}

impl ReportDelivery {
    pub fn location(&self) -> &str {
        match self {
            Self::Saved { location } | Self::Shared { location } => location,
        }
    }
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Could not save the report: {0}")]
    Io(#[from] std::io::Error),
    #[error("The report was empty")]
    Empty,
    #[error("Could not share the report: {0}")]
    Share(String),
}

/// Destination for downloaded reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(
        &self,
        session_id: &SessionId,
        document: ReportDocument,
    ) -> Result<ReportDelivery, ReportError>;
}

#[async_trait]
impl<T: ReportSink + ?Sized> ReportSink for Arc<T> {
    async fn deliver(
        &self,
        session_id: &SessionId,
        document: ReportDocument,
    ) -> Result<ReportDelivery, ReportError> {
        (**self).deliver(session_id, document).await
    }
}

/// Writes reports into a directory and optionally hands them to a share program
#[derive(Debug, Clone)]
pub struct FileReportSink {
    dir: PathBuf,
    share_command: Option<String>,
}

impl FileReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            share_command: None,
        }
    }

    #[must_use]
    pub fn with_share_command(mut self, command: Option<String>) -> Self {
        self.share_command = command;
        self
    }

    async fn share(&self, program: &str, path: &std::path::Path) -> Result<(), ReportError> {
        let status = Command::new(program)
            .arg(path)
            .status()
            .await
            .map_err(|e| ReportError::Share(format!("{program}: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(ReportError::Share(format!("{program} exited with {status}")))
        }
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn deliver(
        &self,
        session_id: &SessionId,
        document: ReportDocument,
    ) -> Result<ReportDelivery, ReportError> {
        if document.bytes.is_empty() {
            return Err(ReportError::Empty);
        }

        // Server-chosen names are not trusted as paths
        let file_name = std::path::Path::new(&document.file_name)
            .file_name()
            .map_or_else(
                || ReportDocument::default_file_name(session_id),
                |name| name.to_string_lossy().into_owned(),
            );

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, &document.bytes).await?;
        let location = path.display().to_string();

        tracing::info!(
            session_id = %session_id,
            location = %location,
            bytes = document.bytes.len(),
            content_type = document.content_type.as_deref().unwrap_or("unknown"),
            "Report saved"
        );

        match &self.share_command {
            Some(program) => {
                self.share(program, &path).await?;
                Ok(ReportDelivery::Shared { location })
            }
            None => Ok(ReportDelivery::Saved { location }),
        }
    }
}
