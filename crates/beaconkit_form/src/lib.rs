//! `beaconkit_form` v1:
//! Rust-side application form engine.
//!
//! Pipeline: source workbook -> canonical records -> per-device documents ->
//! zip archive.
//! - `conf`      : sheet/label/column contracts and template layout presets
//! - `spec`      : canonical records, layouts, options and errors
//! - `normalize` : date and scalar field normalization
//! - `extract`   : source workbook extraction
//! - `generate`  : per-device template filling
//! - `packager`  : batch generation and archive packaging
//! - `session`   : upload session over immutable source bytes
//! - `report`    : run-time report models

pub mod conf;
pub mod extract;
pub mod generate;
pub mod normalize;
pub mod packager;
pub mod report;
pub mod session;
pub mod spec;

#[cfg(test)]
mod fixtures;

pub use conf::{
    C_ARCHIVE_NAME, C_TEMPLATE_LAYOUT_VERSION, derive_default_source_layout,
    derive_default_template_layout,
};
pub use extract::{extract_from_workbook, extract_records, extract_records_with_layout};
pub use generate::{generate_document, resolve_target_sheet};
pub use normalize::{
    is_blank, normalize_date, normalize_date_str, normalize_date_text, normalize_scalar,
};
pub use packager::{
    calculate_worker_limit, derive_output_filename, package_devices, package_extracted,
    package_record_set,
};
pub use report::{ReportExtract, ReportExtractBuilder, ReportPackage, ReportPackageBuilder};
pub use session::UploadSession;
pub use spec::{
    EnumBatchFailurePolicy, EnumDeviceField, EnumDiagnosticKind, EnumProfileField,
    FormEngineError, SpecArchive, SpecCustomerProfile, SpecDeviceRecord, SpecFieldDiagnostic,
    SpecInfoRecord, SpecNormalizedValue, SpecOutputDocument, SpecPackageOptions, SpecRecordSet,
    SpecSkippedDevice, SpecSourceLayout, SpecTemplateLayout,
};
