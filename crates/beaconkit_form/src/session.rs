//! Upload sessions: one immutable source workbook per upload.

use std::sync::Arc;

use log::debug;
use uuid::Uuid;

use crate::extract::extract_records_with_layout;
use crate::packager::package_extracted;
use crate::report::{ReportExtract, ReportPackage};
use crate::spec::{
    FormEngineError, SpecArchive, SpecPackageOptions, SpecSourceLayout, SpecTemplateLayout,
};

/// Uploaded source workbook plus a correlation id.
///
/// Cloning shares the same bytes. A new upload is a new session, so
/// in-flight passes keep reading the bytes they started with.
#[derive(Debug, Clone)]
pub struct UploadSession {
    session_id: Uuid,
    bytes: Arc<[u8]>,
    layout: Arc<SpecSourceLayout>,
}

impl UploadSession {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::with_layout(bytes, SpecSourceLayout::default())
    }

    pub fn with_layout(bytes: impl Into<Arc<[u8]>>, layout: SpecSourceLayout) -> Self {
        let session = Self {
            session_id: Uuid::new_v4(),
            bytes: bytes.into(),
            layout: Arc::new(layout),
        };
        debug!(
            "Opened upload session {} (bytes={})",
            session.session_id,
            session.bytes.len()
        );
        session
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Run extraction over the session's workbook.
    pub fn extract(&self) -> Result<ReportExtract, FormEngineError> {
        debug!("Session {}: extracting records", self.session_id);
        extract_records_with_layout(&self.bytes, &self.layout)
    }

    /// Canonical JSON of the session's records.
    pub fn canonical_json(&self) -> Result<String, FormEngineError> {
        self.extract()?.records.to_json()
    }

    /// Extract, then generate and package one document per device.
    pub fn package(
        &self,
        template: &[u8],
        layout: &SpecTemplateLayout,
        options: &SpecPackageOptions,
    ) -> Result<(SpecArchive, ReportPackage), FormEngineError> {
        let report_extract = self.extract()?;
        debug!(
            "Session {}: packaging {} device(s)",
            self.session_id,
            report_extract.device_count()
        );
        package_extracted(template, report_extract, layout, options)
    }
}
