//! Canonical records, layouts, options and top-level error types.

use beaconkit_io_xlsx::XlsxError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Semantic fields of the customer profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumProfileField {
    CompanyName,
    Location,
    OfficialAccountName,
    BasicId,
    ProviderId,
    ProviderName,
    ChannelId,
    ChannelSecret,
    ContactName,
    ContactEmail,
    CampaignStart,
    CampaignEnd,
    SpecialRequest,
    SubmitDate,
}

impl EnumProfileField {
    /// Every field in canonical JSON order.
    pub const ALL: [EnumProfileField; 14] = [
        Self::CompanyName,
        Self::Location,
        Self::OfficialAccountName,
        Self::BasicId,
        Self::ProviderId,
        Self::ProviderName,
        Self::ChannelId,
        Self::ChannelSecret,
        Self::ContactName,
        Self::ContactEmail,
        Self::CampaignStart,
        Self::CampaignEnd,
        Self::SpecialRequest,
        Self::SubmitDate,
    ];

    /// Canonical JSON key. Channel keys keep the `chanel_` wire spelling.
    pub fn key(self) -> &'static str {
        match self {
            Self::CompanyName => "company_name",
            Self::Location => "location",
            Self::OfficialAccountName => "official_account_name",
            Self::BasicId => "basic_id",
            Self::ProviderId => "provider_id",
            Self::ProviderName => "provider_name",
            Self::ChannelId => "chanel_id",
            Self::ChannelSecret => "chanel_secret",
            Self::ContactName => "contact_name",
            Self::ContactEmail => "contact_email",
            Self::CampaignStart => "campaign_start",
            Self::CampaignEnd => "campaign_end",
            Self::SpecialRequest => "special_request",
            Self::SubmitDate => "submit_date",
        }
    }

    /// Fields routed through date normalization.
    pub fn is_date(self) -> bool {
        matches!(self, Self::CampaignStart | Self::CampaignEnd | Self::SubmitDate)
    }

    /// Numeric identifiers that must always be stored as strings.
    pub fn is_identifier(self) -> bool {
        matches!(self, Self::ProviderId | Self::ChannelId)
    }
}

/// Device fields injected into the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumDeviceField {
    Hwid,
    BannerTitleTh,
    BannerMessageTh,
    BannerTitleEn,
    BannerMessageEn,
    BannerType,
    BannerUrl,
    Location,
}

impl EnumDeviceField {
    pub fn key(self) -> &'static str {
        match self {
            Self::Hwid => "hwid",
            Self::BannerTitleTh => "banner_title_th",
            Self::BannerMessageTh => "banner_message_th",
            Self::BannerTitleEn => "banner_title_en",
            Self::BannerMessageEn => "banner_message_en",
            Self::BannerType => "banner_type",
            Self::BannerUrl => "banner_url",
            Self::Location => "location",
        }
    }
}

/// Kind of a recovered, per-field degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumDiagnosticKind {
    /// A date field could not be reformatted; the raw text was kept.
    DateFormatUnparseable,
    /// A template coordinate could not be written; the cell was left unset.
    TemplateInjectionFailure,
}

/// Batch behavior when one device document fails to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumBatchFailurePolicy {
    /// Abort the whole batch on the first failure; no archive is produced.
    #[default]
    AbortAll,
    /// Omit failing devices and list them in the package report.
    SkipAndReport,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CanonicalRecords

/// Canonical customer profile. Every field defaults to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecCustomerProfile {
    pub company_name: String,
    pub location: String,
    pub official_account_name: String,
    pub basic_id: String,
    pub provider_id: String,
    pub provider_name: String,
    #[serde(rename = "chanel_id")]
    pub channel_id: String,
    #[serde(rename = "chanel_secret")]
    pub channel_secret: String,
    pub contact_name: String,
    pub contact_email: String,
    pub campaign_start: String,
    pub campaign_end: String,
    pub special_request: String,
    /// Always `DD/MM/YYYY` unless the source was unparseable.
    pub submit_date: String,
}

impl SpecCustomerProfile {
    pub fn get(&self, field: EnumProfileField) -> &str {
        match field {
            EnumProfileField::CompanyName => &self.company_name,
            EnumProfileField::Location => &self.location,
            EnumProfileField::OfficialAccountName => &self.official_account_name,
            EnumProfileField::BasicId => &self.basic_id,
            EnumProfileField::ProviderId => &self.provider_id,
            EnumProfileField::ProviderName => &self.provider_name,
            EnumProfileField::ChannelId => &self.channel_id,
            EnumProfileField::ChannelSecret => &self.channel_secret,
            EnumProfileField::ContactName => &self.contact_name,
            EnumProfileField::ContactEmail => &self.contact_email,
            EnumProfileField::CampaignStart => &self.campaign_start,
            EnumProfileField::CampaignEnd => &self.campaign_end,
            EnumProfileField::SpecialRequest => &self.special_request,
            EnumProfileField::SubmitDate => &self.submit_date,
        }
    }

    pub fn set(&mut self, field: EnumProfileField, value: String) {
        let slot = match field {
            EnumProfileField::CompanyName => &mut self.company_name,
            EnumProfileField::Location => &mut self.location,
            EnumProfileField::OfficialAccountName => &mut self.official_account_name,
            EnumProfileField::BasicId => &mut self.basic_id,
            EnumProfileField::ProviderId => &mut self.provider_id,
            EnumProfileField::ProviderName => &mut self.provider_name,
            EnumProfileField::ChannelId => &mut self.channel_id,
            EnumProfileField::ChannelSecret => &mut self.channel_secret,
            EnumProfileField::ContactName => &mut self.contact_name,
            EnumProfileField::ContactEmail => &mut self.contact_email,
            EnumProfileField::CampaignStart => &mut self.campaign_start,
            EnumProfileField::CampaignEnd => &mut self.campaign_end,
            EnumProfileField::SpecialRequest => &mut self.special_request,
            EnumProfileField::SubmitDate => &mut self.submit_date,
        };
        *slot = value;
    }
}

/// One canonical row of the `Devices` sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecDeviceRecord {
    /// 1-based sequence (`row - 1`).
    pub no: u32,
    pub hwid: String,
    pub banner_title_th: String,
    pub banner_message_th: String,
    pub banner_title_en: String,
    pub banner_message_en: String,
    /// `"Link URL"` whenever the source cell was formula-driven.
    pub banner_type: String,
    pub banner_url: String,
    pub location: String,
}

impl SpecDeviceRecord {
    pub fn get(&self, field: EnumDeviceField) -> &str {
        match field {
            EnumDeviceField::Hwid => &self.hwid,
            EnumDeviceField::BannerTitleTh => &self.banner_title_th,
            EnumDeviceField::BannerMessageTh => &self.banner_message_th,
            EnumDeviceField::BannerTitleEn => &self.banner_title_en,
            EnumDeviceField::BannerMessageEn => &self.banner_message_en,
            EnumDeviceField::BannerType => &self.banner_type,
            EnumDeviceField::BannerUrl => &self.banner_url,
            EnumDeviceField::Location => &self.location,
        }
    }

    pub fn set(&mut self, field: EnumDeviceField, value: String) {
        let slot = match field {
            EnumDeviceField::Hwid => &mut self.hwid,
            EnumDeviceField::BannerTitleTh => &mut self.banner_title_th,
            EnumDeviceField::BannerMessageTh => &mut self.banner_message_th,
            EnumDeviceField::BannerTitleEn => &mut self.banner_title_en,
            EnumDeviceField::BannerMessageEn => &mut self.banner_message_en,
            EnumDeviceField::BannerType => &mut self.banner_type,
            EnumDeviceField::BannerUrl => &mut self.banner_url,
            EnumDeviceField::Location => &mut self.location,
        };
        *slot = value;
    }
}

/// One canonical row of the `Info` sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecInfoRecord {
    #[serde(rename = "type")]
    pub info_type: String,
}

/// The three canonical collections of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecRecordSet {
    pub customer_profile: SpecCustomerProfile,
    pub devices: Vec<SpecDeviceRecord>,
    pub info: Vec<SpecInfoRecord>,
}

impl SpecRecordSet {
    /// Canonical JSON document.
    pub fn to_json(&self) -> Result<String, FormEngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, FormEngineError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Result of one normalization: canonical text plus an optional failure note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecNormalizedValue {
    pub value: String,
    pub diagnostic: Option<String>,
}

impl SpecNormalizedValue {
    pub fn ok(value: String) -> Self {
        Self {
            value,
            diagnostic: None,
        }
    }

    pub fn degraded(value: String, diagnostic: String) -> Self {
        Self {
            value,
            diagnostic: Some(diagnostic),
        }
    }
}

/// One degraded field recorded during extraction or generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecFieldDiagnostic {
    pub kind: EnumDiagnosticKind,
    /// Sheet the value came from or was written to.
    pub sheet: String,
    /// `A1` coordinate, when known.
    pub cell: Option<String>,
    /// Canonical field name.
    pub field: String,
    /// Raw value text.
    pub raw: String,
    pub message: String,
}

/// One device omitted by [`EnumBatchFailurePolicy::SkipAndReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSkippedDevice {
    pub no: u32,
    pub hwid: String,
    pub exception: String,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Layouts

/// Source workbook contract: sheet names and fixed columns (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSourceLayout {
    pub sheet_profile: String,
    pub sheet_devices: String,
    pub sheet_info: String,
    /// Exact label that marks the profile section header row.
    pub profile_section_header: String,
    /// `(label, field)` pairs matched exactly against profile column A.
    pub profile_labels: Vec<(String, EnumProfileField)>,
    pub col_profile_label: u32,
    pub col_profile_value: u32,
    /// First data row of the `Devices` and `Info` sheets.
    pub row_data_start: u32,
    /// Device column per field; the `Hwid` column is the scan sentinel.
    pub device_columns: Vec<(EnumDeviceField, u32)>,
    /// Info `type` column, also the scan sentinel.
    pub col_info_type: u32,
}

impl Default for SpecSourceLayout {
    fn default() -> Self {
        crate::conf::derive_default_source_layout()
    }
}

impl SpecSourceLayout {
    pub fn device_column(&self, field: EnumDeviceField) -> Option<u32> {
        self.device_columns
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, col)| *col)
    }
}

/// Template contract: versioned `A1` coordinate tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecTemplateLayout {
    /// Layout version, also used in output file names.
    pub version: String,
    /// Target sheet; `None` selects the template's active sheet.
    pub sheet_name: Option<String>,
    /// Profile cells written with scalar normalization.
    pub profile_cells: Vec<(EnumProfileField, String)>,
    /// Submit date cell written with date normalization.
    pub submit_date_cell: String,
    /// Device cells; one field may map to several coordinates.
    pub device_cells: Vec<(EnumDeviceField, String)>,
    /// Location owner cell, always written.
    pub location_owner_cell: String,
    pub location_owner_placeholder: String,
}

impl Default for SpecTemplateLayout {
    fn default() -> Self {
        crate::conf::derive_default_template_layout()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region OptionsAndErrors

/// Input options for [`crate::packager::package_devices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecPackageOptions {
    /// Per-device failure behavior.
    pub rule_failure: EnumBatchFailurePolicy,
    /// Maximum generation workers; `None` picks a CPU-bound default.
    pub num_workers_max: Option<usize>,
    /// Download name of the archive.
    pub name_archive: String,
}

impl Default for SpecPackageOptions {
    fn default() -> Self {
        Self {
            rule_failure: EnumBatchFailurePolicy::AbortAll,
            num_workers_max: None,
            name_archive: crate::conf::C_ARCHIVE_NAME.to_string(),
        }
    }
}

/// Packaged archive with its download name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecArchive {
    pub name_archive: String,
    pub bytes: Vec<u8>,
}

/// One generated output document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOutputDocument {
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<SpecFieldDiagnostic>,
}

/// Top-level engine failures.
#[derive(Debug, Error)]
pub enum FormEngineError {
    #[error("Workbook is unreadable: {0}")]
    WorkbookUnreadable(#[source] XlsxError),
    #[error("Template is unreadable: {0}")]
    TemplateUnreadable(#[source] XlsxError),
    #[error("Template has no target sheet: {0}")]
    TemplateSheetMissing(String),
    #[error("Failed to write output document: {0}")]
    DocumentWriteFailed(#[source] XlsxError),
    #[error("Failed to generate document for device no={no} hwid=`{hwid}`: {message}")]
    BatchGenerationFailure {
        no: u32,
        hwid: String,
        message: String,
    },
    #[error("Failed to write archive: {0}")]
    ArchiveWriteFailed(#[source] XlsxError),
    #[error("Failed to serialize canonical records: {0}")]
    Serialization(#[from] serde_json::Error),
}

// #endregion
