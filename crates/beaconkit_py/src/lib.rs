use std::collections::BTreeMap;

use beaconkit_form::{
    EnumBatchFailurePolicy, EnumDiagnosticKind, FormEngineError, ReportExtract, ReportPackage,
    SpecFieldDiagnostic, SpecPackageOptions, SpecSkippedDevice, SpecTemplateLayout, UploadSession,
    normalize_date_str, package_extracted,
};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyBytes;

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "beaconkit.form.package.v1";
const C_BRIDGE_TRANSPORT: &str = "rust_native";

////////////////////////////////////////////////////////////////////////////////
// #region ReportClasses

#[pyclass(name = "FieldDiagnostic")]
#[derive(Debug, Clone)]
struct PyFieldDiagnostic {
    #[pyo3(get)]
    kind: String,
    #[pyo3(get)]
    sheet: String,
    #[pyo3(get)]
    cell: Option<String>,
    #[pyo3(get)]
    field: String,
    #[pyo3(get)]
    raw: String,
    #[pyo3(get)]
    message: String,
}

impl From<SpecFieldDiagnostic> for PyFieldDiagnostic {
    fn from(diagnostic: SpecFieldDiagnostic) -> Self {
        let kind = match diagnostic.kind {
            EnumDiagnosticKind::DateFormatUnparseable => "date_format_unparseable",
            EnumDiagnosticKind::TemplateInjectionFailure => "template_injection_failure",
        };
        Self {
            kind: kind.to_string(),
            sheet: diagnostic.sheet,
            cell: diagnostic.cell,
            field: diagnostic.field,
            raw: diagnostic.raw,
            message: diagnostic.message,
        }
    }
}

#[pymethods]
impl PyFieldDiagnostic {
    fn __repr__(&self) -> String {
        format!(
            "FieldDiagnostic(kind='{}', field='{}', cell={:?})",
            self.kind, self.field, self.cell
        )
    }
}

#[pyclass(name = "SkippedDevice")]
#[derive(Debug, Clone)]
struct PySkippedDevice {
    #[pyo3(get)]
    no: u32,
    #[pyo3(get)]
    hwid: String,
    #[pyo3(get)]
    exception: String,
}

impl From<SpecSkippedDevice> for PySkippedDevice {
    fn from(skipped: SpecSkippedDevice) -> Self {
        Self {
            no: skipped.no,
            hwid: skipped.hwid,
            exception: skipped.exception,
        }
    }
}

#[pyclass(name = "ReportExtract")]
#[derive(Debug, Clone)]
struct PyReportExtract {
    /// Canonical records as a JSON document.
    #[pyo3(get)]
    records_json: String,
    #[pyo3(get)]
    cnt_devices: u64,
    #[pyo3(get)]
    cnt_info: u64,
    #[pyo3(get)]
    cnt_profile_fields: u64,
    #[pyo3(get)]
    cnt_rows_scanned: u64,
    #[pyo3(get)]
    sheets_found: Vec<String>,
    #[pyo3(get)]
    sheets_missing: Vec<String>,
    #[pyo3(get)]
    diagnostics: Vec<PyFieldDiagnostic>,
    #[pyo3(get)]
    warnings: Vec<String>,
}

impl TryFrom<ReportExtract> for PyReportExtract {
    type Error = FormEngineError;

    fn try_from(report_extract: ReportExtract) -> Result<Self, Self::Error> {
        Ok(Self {
            records_json: report_extract.records.to_json()?,
            cnt_devices: report_extract.device_count() as u64,
            cnt_info: report_extract.info_count() as u64,
            cnt_profile_fields: report_extract.cnt_profile_fields,
            cnt_rows_scanned: report_extract.cnt_rows_scanned,
            sheets_found: report_extract.sheets_found,
            sheets_missing: report_extract.sheets_missing,
            diagnostics: report_extract
                .diagnostics
                .into_iter()
                .map(PyFieldDiagnostic::from)
                .collect(),
            warnings: report_extract.warnings,
        })
    }
}

#[pymethods]
impl PyReportExtract {
    #[getter]
    fn diagnostic_count(&self) -> usize {
        self.diagnostics.len()
    }

    #[getter]
    fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_devices".to_string(), self.cnt_devices);
        dict_counts.insert("cnt_info".to_string(), self.cnt_info);
        dict_counts.insert("cnt_profile_fields".to_string(), self.cnt_profile_fields);
        dict_counts.insert("cnt_rows_scanned".to_string(), self.cnt_rows_scanned);
        dict_counts.insert(
            "cnt_sheets_missing".to_string(),
            self.sheets_missing.len() as u64,
        );
        dict_counts.insert(
            "cnt_diagnostics".to_string(),
            self.diagnostic_count() as u64,
        );
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    #[pyo3(signature = (prefix = "[EXTRACT]"))]
    fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} devices={} info={} profile_fields={} rows_scanned={} sheets_missing={} diagnostics={} warnings={}",
            self.cnt_devices,
            self.cnt_info,
            self.cnt_profile_fields,
            self.cnt_rows_scanned,
            self.sheets_missing.len(),
            self.diagnostic_count(),
            self.warning_count()
        )
    }

    fn __str__(&self) -> String {
        self.format("[EXTRACT]")
    }
}

#[pyclass(name = "ReportPackage")]
#[derive(Debug, Clone)]
struct PyReportPackage {
    #[pyo3(get)]
    name_archive: String,
    #[pyo3(get)]
    cnt_devices: u64,
    #[pyo3(get)]
    cnt_generated: u64,
    #[pyo3(get)]
    entry_names: Vec<String>,
    #[pyo3(get)]
    skipped: Vec<PySkippedDevice>,
    #[pyo3(get)]
    diagnostics: Vec<PyFieldDiagnostic>,
    #[pyo3(get)]
    warnings: Vec<String>,
}

impl PyReportPackage {
    fn from_report(name_archive: String, report_package: ReportPackage) -> Self {
        Self {
            name_archive,
            cnt_devices: report_package.cnt_devices,
            cnt_generated: report_package.cnt_generated,
            entry_names: report_package.entry_names,
            skipped: report_package
                .skipped
                .into_iter()
                .map(PySkippedDevice::from)
                .collect(),
            diagnostics: report_package
                .diagnostics
                .into_iter()
                .map(PyFieldDiagnostic::from)
                .collect(),
            warnings: report_package.warnings,
        }
    }
}

#[pymethods]
impl PyReportPackage {
    #[getter]
    fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    #[getter]
    fn diagnostic_count(&self) -> usize {
        self.diagnostics.len()
    }

    #[getter]
    fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_devices".to_string(), self.cnt_devices);
        dict_counts.insert("cnt_generated".to_string(), self.cnt_generated);
        dict_counts.insert("cnt_skipped".to_string(), self.skipped_count() as u64);
        dict_counts.insert(
            "cnt_diagnostics".to_string(),
            self.diagnostic_count() as u64,
        );
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    #[pyo3(signature = (prefix = "[PACKAGE]"))]
    fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} devices={} generated={} skipped={} diagnostics={} warnings={}",
            self.cnt_devices,
            self.cnt_generated,
            self.skipped_count(),
            self.diagnostic_count(),
            self.warning_count()
        )
    }

    fn __str__(&self) -> String {
        self.format("[PACKAGE]")
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Parsing

fn parse_rule_failure(value: &str) -> PyResult<EnumBatchFailurePolicy> {
    match value {
        "abort" => Ok(EnumBatchFailurePolicy::AbortAll),
        "skip" => Ok(EnumBatchFailurePolicy::SkipAndReport),
        _ => Err(PyValueError::new_err(format!(
            "Invalid failure policy: `{value}`. Expected one of: ['abort', 'skip']"
        ))),
    }
}

fn derive_package_options(
    rule_failure: &str,
    num_workers_max: Option<usize>,
) -> PyResult<SpecPackageOptions> {
    Ok(SpecPackageOptions {
        rule_failure: parse_rule_failure(rule_failure)?,
        num_workers_max,
        ..SpecPackageOptions::default()
    })
}

fn map_form_engine_error(exception: FormEngineError) -> PyErr {
    match exception {
        FormEngineError::WorkbookUnreadable(_)
        | FormEngineError::TemplateUnreadable(_)
        | FormEngineError::TemplateSheetMissing(_) => PyValueError::new_err(exception.to_string()),
        FormEngineError::DocumentWriteFailed(_)
        | FormEngineError::BatchGenerationFailure { .. }
        | FormEngineError::ArchiveWriteFailed(_)
        | FormEngineError::Serialization(_) => PyRuntimeError::new_err(exception.to_string()),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Session

#[pyclass(name = "UploadSession")]
#[derive(Debug, Clone)]
struct PyUploadSession {
    session: UploadSession,
}

#[pymethods]
impl PyUploadSession {
    #[new]
    fn new(data: &[u8]) -> Self {
        Self {
            session: UploadSession::new(data.to_vec()),
        }
    }

    #[getter]
    fn session_id(&self) -> String {
        self.session.session_id().to_string()
    }

    fn extract(&self, py: Python<'_>) -> PyResult<PyReportExtract> {
        let session = self.session.clone();
        let report_extract = py
            .allow_threads(move || session.extract())
            .map_err(map_form_engine_error)?;
        PyReportExtract::try_from(report_extract).map_err(map_form_engine_error)
    }

    fn generate_json(&self, py: Python<'_>) -> PyResult<String> {
        let session = self.session.clone();
        py.allow_threads(move || session.canonical_json())
            .map_err(map_form_engine_error)
    }

    #[pyo3(signature = (template, rule_failure = "abort", num_workers_max = None))]
    fn package<'py>(
        &self,
        py: Python<'py>,
        template: &[u8],
        rule_failure: &str,
        num_workers_max: Option<usize>,
    ) -> PyResult<(Bound<'py, PyBytes>, PyReportPackage)> {
        let spec_pkg_options = derive_package_options(rule_failure, num_workers_max)?;
        let session = self.session.clone();
        let (archive, report_package) = py
            .allow_threads(|| {
                session.package(template, &SpecTemplateLayout::default(), &spec_pkg_options)
            })
            .map_err(map_form_engine_error)?;
        Ok((
            PyBytes::new(py, &archive.bytes),
            PyReportPackage::from_report(archive.name_archive, report_package),
        ))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Functions

#[pyfunction(name = "normalize_date")]
fn normalize_date_py(value: &str) -> String {
    normalize_date_str(value)
}

#[pyfunction(name = "extract_records_json")]
fn extract_records_json_py(py: Python<'_>, data: &[u8]) -> PyResult<String> {
    py.allow_threads(|| beaconkit_form::extract_records(data)?.records.to_json())
        .map_err(map_form_engine_error)
}

#[pyfunction(name = "package_devices")]
#[pyo3(signature = (data, template, rule_failure = "abort", num_workers_max = None))]
fn package_devices_py<'py>(
    py: Python<'py>,
    data: &[u8],
    template: &[u8],
    rule_failure: &str,
    num_workers_max: Option<usize>,
) -> PyResult<(Bound<'py, PyBytes>, PyReportPackage)> {
    let spec_pkg_options = derive_package_options(rule_failure, num_workers_max)?;
    let (archive, report_package) = py
        .allow_threads(|| {
            let report_extract = beaconkit_form::extract_records(data)?;
            package_extracted(
                template,
                report_extract,
                &SpecTemplateLayout::default(),
                &spec_pkg_options,
            )
        })
        .map_err(map_form_engine_error)?;
    Ok((
        PyBytes::new(py, &archive.bytes),
        PyReportPackage::from_report(archive.name_archive, report_package),
    ))
}

// #endregion

#[pymodule]
fn _beaconkit_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyFieldDiagnostic>()?;
    module.add_class::<PySkippedDevice>()?;
    module.add_class::<PyReportExtract>()?;
    module.add_class::<PyReportPackage>()?;
    module.add_class::<PyUploadSession>()?;
    module.add_function(wrap_pyfunction!(normalize_date_py, module)?)?;
    module.add_function(wrap_pyfunction!(extract_records_json_py, module)?)?;
    module.add_function(wrap_pyfunction!(package_devices_py, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
