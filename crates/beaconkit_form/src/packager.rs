//! Batch document generation and zip packaging.
//!
//! Each device gets its own document generated from the shared immutable
//! template bytes. Generation runs serially or on a bounded rayon pool;
//! archive entries always follow extraction order.

use beaconkit_io_xlsx::{SpecArchiveEntry, XlsxPackage, write_zip_archive};
use log::{info, warn};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::conf::{C_OUTPUT_EXTENSION, C_OUTPUT_TITLE};
use crate::generate::{generate_document, resolve_target_sheet};
use crate::report::{ReportExtract, ReportPackage, ReportPackageBuilder};
use crate::spec::{
    EnumBatchFailurePolicy, FormEngineError, SpecArchive, SpecCustomerProfile, SpecDeviceRecord,
    SpecOutputDocument, SpecPackageOptions, SpecRecordSet, SpecTemplateLayout,
};

/// Calculate bounded worker count.
///
/// `Some(n)` is clamped to `[1, n_cpu]`; `None` picks `n_cpu` capped at 8.
pub fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

/// Archive entry name for one device document.
///
/// `[{official_account_name}]{seq}[{hwid}]_{title}-{version}.{ext}`; `seq`
/// is 1-based in extraction order.
pub fn derive_output_filename(
    profile: &SpecCustomerProfile,
    n_seq: usize,
    device: &SpecDeviceRecord,
    layout: &SpecTemplateLayout,
) -> String {
    format!(
        "[{}]{}[{}]_{}-{}.{}",
        profile.official_account_name,
        n_seq,
        device.hwid,
        C_OUTPUT_TITLE,
        layout.version,
        C_OUTPUT_EXTENSION
    )
}

/// Generate and package all devices of an extracted record set.
pub fn package_record_set(
    template: &[u8],
    record_set: &SpecRecordSet,
    layout: &SpecTemplateLayout,
    options: &SpecPackageOptions,
) -> Result<(SpecArchive, ReportPackage), FormEngineError> {
    package_devices(
        template,
        &record_set.customer_profile,
        &record_set.devices,
        layout,
        options,
    )
}

/// Package an extraction result, carrying its diagnostics into the report.
///
/// Extraction diagnostics come first, followed by generation diagnostics.
pub fn package_extracted(
    template: &[u8],
    report_extract: ReportExtract,
    layout: &SpecTemplateLayout,
    options: &SpecPackageOptions,
) -> Result<(SpecArchive, ReportPackage), FormEngineError> {
    let (archive, mut report) =
        package_record_set(template, &report_extract.records, layout, options)?;
    let mut l_diagnostics = report_extract.diagnostics;
    l_diagnostics.append(&mut report.diagnostics);
    report.diagnostics = l_diagnostics;
    Ok((archive, report))
}

/// Generate one document per device and pack them into one zip archive.
///
/// Returns [`FormEngineError`] for setup failures (unreadable template,
/// missing target sheet), for the first failing device under
/// [`EnumBatchFailurePolicy::AbortAll`], and for archive write failures.
/// Under [`EnumBatchFailurePolicy::SkipAndReport`] failing devices are listed
/// in the report instead.
pub fn package_devices(
    template: &[u8],
    profile: &SpecCustomerProfile,
    devices: &[SpecDeviceRecord],
    layout: &SpecTemplateLayout,
    options: &SpecPackageOptions,
) -> Result<(SpecArchive, ReportPackage), FormEngineError> {
    let meta = XlsxPackage::from_bytes(template)
        .and_then(|package| package.workbook_meta())
        .map_err(FormEngineError::TemplateUnreadable)?;
    resolve_target_sheet(&meta, layout)?;

    let n_workers_max = calculate_worker_limit(options.num_workers_max);
    let mut builder = ReportPackageBuilder {
        cnt_devices: devices.len() as u64,
        ..ReportPackageBuilder::default()
    };

    let generate = |(n_idx, device): (usize, &SpecDeviceRecord)| {
        let c_name = derive_output_filename(profile, n_idx + 1, device, layout);
        (c_name, generate_document(template, profile, device, layout))
    };
    let l_results = run_generation(devices, n_workers_max, &mut builder, generate);

    let l_entries =
        collect_archive_entries(l_results, devices, options.rule_failure, &mut builder)?;

    let bytes = write_zip_archive(&l_entries).map_err(FormEngineError::ArchiveWriteFailed)?;
    let report = builder.build();
    info!(
        "Packaged `{}`: {} (workers={})",
        options.name_archive, report, n_workers_max
    );
    Ok((
        SpecArchive {
            name_archive: options.name_archive.clone(),
            bytes,
        },
        report,
    ))
}

type GenerationResult = (String, Result<SpecOutputDocument, FormEngineError>);

/// Apply the failure policy to per-device results, in extraction order.
fn collect_archive_entries(
    l_results: Vec<GenerationResult>,
    devices: &[SpecDeviceRecord],
    rule_failure: EnumBatchFailurePolicy,
    builder: &mut ReportPackageBuilder,
) -> Result<Vec<SpecArchiveEntry>, FormEngineError> {
    let mut l_entries = Vec::with_capacity(l_results.len());
    for ((c_name, res_document), device) in l_results.into_iter().zip(devices) {
        match res_document {
            Ok(document) => {
                builder.add_generated(c_name.clone(), document.diagnostics);
                l_entries.push(SpecArchiveEntry {
                    name: c_name,
                    bytes: document.bytes,
                });
            }
            Err(e) => match rule_failure {
                EnumBatchFailurePolicy::AbortAll => {
                    return Err(FormEngineError::BatchGenerationFailure {
                        no: device.no,
                        hwid: device.hwid.clone(),
                        message: e.to_string(),
                    });
                }
                EnumBatchFailurePolicy::SkipAndReport => {
                    warn!(
                        "Skipped device no={} hwid=`{}`: {e}",
                        device.no, device.hwid
                    );
                    builder.add_skipped(device.no, device.hwid.clone(), e.to_string());
                }
            },
        }
    }
    Ok(l_entries)
}

fn run_generation<F>(
    devices: &[SpecDeviceRecord],
    n_workers_max: usize,
    builder: &mut ReportPackageBuilder,
    generate: F,
) -> Vec<GenerationResult>
where
    F: Fn((usize, &SpecDeviceRecord)) -> GenerationResult + Sync + Send,
{
    if n_workers_max <= 1 || devices.len() <= 1 {
        return devices.iter().enumerate().map(&generate).collect();
    }

    let thread_pool = ThreadPoolBuilder::new().num_threads(n_workers_max).build();
    let Ok(thread_pool) = thread_pool else {
        builder.add_warning(format!(
            "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial generation."
        ));
        return devices.iter().enumerate().map(&generate).collect();
    };

    thread_pool.install(|| {
        devices
            .par_iter()
            .enumerate()
            .map(&generate)
            .collect::<Vec<_>>()
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use beaconkit_io_xlsx::{EnumCellValue, SpecCellRef, XlsxWorkbook, read_zip_entry_names};

    use super::*;
    use crate::extract::extract_records;
    use crate::fixtures::{build_source_workbook, build_template_workbook};

    fn derive_device(no: u32, hwid: &str) -> SpecDeviceRecord {
        SpecDeviceRecord {
            no,
            hwid: hwid.to_string(),
            ..SpecDeviceRecord::default()
        }
    }

    fn derive_profile() -> SpecCustomerProfile {
        SpecCustomerProfile {
            official_account_name: "AcmeOA".to_string(),
            ..SpecCustomerProfile::default()
        }
    }

    fn read_entry(archive_bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = zip::ZipArchive::new(Cursor::new(archive_bytes)).expect("open archive");
        let mut bytes = Vec::new();
        archive
            .by_name(name)
            .expect("entry")
            .read_to_end(&mut bytes)
            .expect("read entry");
        bytes
    }

    #[test]
    fn test_derive_output_filename_matches_pattern() {
        let c_name = derive_output_filename(
            &derive_profile(),
            3,
            &derive_device(3, "HW3"),
            &SpecTemplateLayout::default(),
        );
        assert_eq!(
            c_name,
            "[AcmeOA]3[HW3]_TH-LINE Beacon Banner_Stay event Application Form-v1-1.xlsx"
        );
    }

    #[test]
    fn test_calculate_worker_limit_is_bounded() {
        assert_eq!(calculate_worker_limit(Some(0)), 1);
        assert_eq!(calculate_worker_limit(Some(1)), 1);
        let n_default = calculate_worker_limit(None);
        assert!((1..=8).contains(&n_default));
    }

    #[test]
    fn test_package_devices_keeps_extraction_order_across_worker_counts() {
        let template = build_template_workbook();
        let l_devices: Vec<SpecDeviceRecord> = (1..=6)
            .map(|no| derive_device(no, &format!("HW{no}")))
            .collect();

        for num_workers_max in [Some(1), Some(4), None] {
            let options = SpecPackageOptions {
                num_workers_max,
                ..SpecPackageOptions::default()
            };
            let (archive, report) = package_devices(
                &template,
                &derive_profile(),
                &l_devices,
                &SpecTemplateLayout::default(),
                &options,
            )
            .expect("package");

            assert_eq!(archive.name_archive, "updated_files.zip");
            let l_names = read_zip_entry_names(&archive.bytes).expect("names");
            assert_eq!(l_names.len(), l_devices.len());
            for (n_idx, c_name) in l_names.iter().enumerate() {
                assert!(c_name.starts_with(&format!("[AcmeOA]{}[HW{}]_", n_idx + 1, n_idx + 1)));
            }
            assert_eq!(l_names, report.entry_names);
            assert_eq!(report.cnt_generated, 6);
            assert_eq!(report.skipped_count(), 0);
        }
    }

    #[test]
    fn test_package_devices_with_no_devices_yields_empty_archive() {
        let (archive, report) = package_devices(
            &build_template_workbook(),
            &derive_profile(),
            &[],
            &SpecTemplateLayout::default(),
            &SpecPackageOptions::default(),
        )
        .expect("package");
        assert!(read_zip_entry_names(&archive.bytes).expect("names").is_empty());
        assert_eq!(report.cnt_devices, 0);
    }

    #[test]
    fn test_package_devices_rejects_bad_template_up_front() {
        let res = package_devices(
            b"not a template",
            &derive_profile(),
            &[derive_device(1, "HW1")],
            &SpecTemplateLayout::default(),
            &SpecPackageOptions::default(),
        );
        assert!(matches!(res, Err(FormEngineError::TemplateUnreadable(_))));

        let layout = SpecTemplateLayout {
            sheet_name: Some("Nope".to_string()),
            ..SpecTemplateLayout::default()
        };
        let res = package_devices(
            &build_template_workbook(),
            &derive_profile(),
            &[derive_device(1, "HW1")],
            &layout,
            &SpecPackageOptions::default(),
        );
        assert!(matches!(res, Err(FormEngineError::TemplateSheetMissing(_))));
    }

    fn derive_results(l_devices: &[SpecDeviceRecord]) -> Vec<GenerationResult> {
        l_devices
            .iter()
            .map(|device| {
                let res_document = if device.hwid == "HW2" {
                    Err(FormEngineError::TemplateSheetMissing("Form".to_string()))
                } else {
                    Ok(SpecOutputDocument {
                        bytes: device.hwid.as_bytes().to_vec(),
                        diagnostics: Vec::new(),
                    })
                };
                (format!("{}.xlsx", device.hwid), res_document)
            })
            .collect()
    }

    #[test]
    fn test_collect_archive_entries_abort_names_first_failure() {
        let l_devices: Vec<SpecDeviceRecord> = (1..=3)
            .map(|no| derive_device(no, &format!("HW{no}")))
            .collect();
        let mut builder = ReportPackageBuilder::default();

        let res = collect_archive_entries(
            derive_results(&l_devices),
            &l_devices,
            EnumBatchFailurePolicy::AbortAll,
            &mut builder,
        );
        match res {
            Err(FormEngineError::BatchGenerationFailure { no, hwid, message }) => {
                assert_eq!(no, 2);
                assert_eq!(hwid, "HW2");
                assert!(message.contains("Form"));
            }
            other => panic!("expected batch failure, got {other:?}"),
        }
    }

    #[test]
    fn test_collect_archive_entries_skip_reports_omissions() {
        let l_devices: Vec<SpecDeviceRecord> = (1..=3)
            .map(|no| derive_device(no, &format!("HW{no}")))
            .collect();
        let mut builder = ReportPackageBuilder {
            cnt_devices: 3,
            ..ReportPackageBuilder::default()
        };

        let l_entries = collect_archive_entries(
            derive_results(&l_devices),
            &l_devices,
            EnumBatchFailurePolicy::SkipAndReport,
            &mut builder,
        )
        .expect("collect");
        let l_names: Vec<&str> = l_entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(l_names, vec!["HW1.xlsx", "HW3.xlsx"]);

        let report = builder.build();
        assert_eq!(report.cnt_generated, 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.skipped[0].no, 2);
        assert_eq!(report.skipped[0].hwid, "HW2");
        assert_eq!(report.cnt_generated + report.skipped_count() as u64, report.cnt_devices);
    }

    #[test]
    fn test_run_generation_parallel_matches_serial() {
        let l_devices: Vec<SpecDeviceRecord> = (1..=5)
            .map(|no| derive_device(no, &format!("HW{no}")))
            .collect();
        let generate = |(n_idx, device): (usize, &SpecDeviceRecord)| {
            let document = SpecOutputDocument {
                bytes: device.hwid.as_bytes().to_vec(),
                diagnostics: Vec::new(),
            };
            (format!("{}.xlsx", n_idx + 1), Ok::<_, FormEngineError>(document))
        };

        let mut builder = ReportPackageBuilder::default();
        let l_serial: Vec<String> = run_generation(&l_devices, 1, &mut builder, generate)
            .into_iter()
            .map(|(c_name, _)| c_name)
            .collect();
        let l_parallel: Vec<String> = run_generation(&l_devices, 3, &mut builder, generate)
            .into_iter()
            .map(|(c_name, _)| c_name)
            .collect();
        assert_eq!(l_serial, l_parallel);
        assert_eq!(l_serial[4], "5.xlsx");
    }

    #[test]
    fn test_package_extracted_reports_extraction_diagnostics_first() {
        let source = build_source_workbook(
            &[
                ("LINE Official Account name", "AcmeOA"),
                ("Campaign End", "next week"),
                ("Submit Date", "not a date"),
            ],
            &[("HW1", "a", "Image", "", "")],
            &[],
        );
        let report_extract = extract_records(&source).expect("extract");
        assert_eq!(report_extract.diagnostic_count(), 2);

        let (archive, report) = package_extracted(
            &build_template_workbook(),
            report_extract,
            &SpecTemplateLayout::default(),
            &SpecPackageOptions::default(),
        )
        .expect("package");
        assert_eq!(read_zip_entry_names(&archive.bytes).expect("names").len(), 1);

        let l_fields: Vec<(&str, Option<&str>)> = report
            .diagnostics
            .iter()
            .map(|d| (d.field.as_str(), d.cell.as_deref()))
            .collect();
        assert_eq!(
            l_fields,
            vec![
                ("campaign_end", Some("B2")),
                ("submit_date", Some("B3")),
                ("submit_date", Some("K60")),
            ]
        );
    }

    #[test]
    fn test_package_end_to_end_from_source_workbook() {
        let source = build_source_workbook(
            &[
                ("Company Name", "Acme "),
                ("LINE Official Account name", "AcmeOA"),
                ("Submit Date", "31/1/24"),
            ],
            &[
                ("HW1", "สวัสดี", "=X", "http://u", ""),
                ("HW2", "hello", "Image", "", "Mall"),
            ],
            &["Beacon"],
        );
        let template = build_template_workbook();
        let record_set = extract_records(&source).expect("extract").records;

        let (archive, report) = package_record_set(
            &template,
            &record_set,
            &SpecTemplateLayout::default(),
            &SpecPackageOptions::default(),
        )
        .expect("package");
        assert_eq!(report.cnt_generated, record_set.devices.len() as u64);

        let c_first = "[AcmeOA]1[HW1]_TH-LINE Beacon Banner_Stay event Application Form-v1-1.xlsx";
        let grid = XlsxWorkbook::open(&read_entry(&archive.bytes, c_first))
            .expect("open document")
            .sheet("Form")
            .expect("decode")
            .expect("sheet");
        let text_at = |a1: &str| grid.cell_at(SpecCellRef::parse(a1).expect("a1")).clone();
        assert_eq!(text_at("D9"), EnumCellValue::String("Acme".to_string()));
        assert_eq!(text_at("D23"), EnumCellValue::String("HW1".to_string()));
        assert_eq!(text_at("D36"), EnumCellValue::String("http://u".to_string()));
        assert_eq!(text_at("F41"), EnumCellValue::String("สวัสดี".to_string()));
        assert_eq!(text_at("K60"), EnumCellValue::String("31/01/2024".to_string()));
    }
}
