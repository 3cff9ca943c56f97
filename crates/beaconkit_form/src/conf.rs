//! Fixed workbook contracts and default presets.

use crate::spec::{EnumDeviceField, EnumProfileField, SpecSourceLayout, SpecTemplateLayout};

////////////////////////////////////////////////////////////////////////////////
// #region SourceWorkbook

pub const C_SHEET_CUSTOMER_PROFILE: &str = "CustomerProfile";
pub const C_SHEET_DEVICES: &str = "Devices";
pub const C_SHEET_INFO: &str = "Info";

/// Section header row skipped while scanning the profile sheet.
pub const C_PROFILE_SECTION_HEADER: &str = "ข้อมูลบริษัทและบัญชี LINE OA";

/// Profile labels (column A) and the fields they feed.
pub const TUP_PROFILE_LABELS: [(&str, EnumProfileField); 14] = [
    ("Company Name", EnumProfileField::CompanyName),
    ("Location", EnumProfileField::Location),
    ("LINE Official Account name", EnumProfileField::OfficialAccountName),
    ("LINE Basic ID / Premium ID", EnumProfileField::BasicId),
    ("LINE Provider ID", EnumProfileField::ProviderId),
    ("LINE Provider Name", EnumProfileField::ProviderName),
    ("LINE Chanel ID", EnumProfileField::ChannelId),
    ("LINE Chanel Secret", EnumProfileField::ChannelSecret),
    ("Contact Name", EnumProfileField::ContactName),
    ("Contact Email", EnumProfileField::ContactEmail),
    ("Campaign Start", EnumProfileField::CampaignStart),
    ("Campaign End", EnumProfileField::CampaignEnd),
    ("Special Request", EnumProfileField::SpecialRequest),
    ("Submit Date", EnumProfileField::SubmitDate),
];

/// `Devices` columns (1-based): B, C, E, G, I, J, L, M.
pub const TUP_DEVICE_COLUMNS: [(EnumDeviceField, u32); 8] = [
    (EnumDeviceField::Hwid, 2),
    (EnumDeviceField::BannerTitleTh, 3),
    (EnumDeviceField::BannerMessageTh, 5),
    (EnumDeviceField::BannerTitleEn, 7),
    (EnumDeviceField::BannerMessageEn, 9),
    (EnumDeviceField::BannerType, 10),
    (EnumDeviceField::BannerUrl, 12),
    (EnumDeviceField::Location, 13),
];

pub const N_ROW_DATA_START: u32 = 2;
pub const N_COL_PROFILE_LABEL: u32 = 1;
pub const N_COL_PROFILE_VALUE: u32 = 2;
pub const N_COL_INFO_TYPE: u32 = 1;

/// Two-digit years below this pivot are shifted into the 2000s.
pub const N_YEAR_PIVOT: i64 = 2000;

/// Canonical banner type for formula-driven source cells.
pub const C_BANNER_TYPE_LINK_URL: &str = "Link URL";

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TemplateAndOutput

pub const C_TEMPLATE_LAYOUT_VERSION: &str = "v1-1";
pub const C_LOCATION_OWNER_PLACEHOLDER: &str = "[Official name of the Location owner]";

/// Output document title between the device id and the layout version.
pub const C_OUTPUT_TITLE: &str = "TH-LINE Beacon Banner_Stay event Application Form";
pub const C_OUTPUT_EXTENSION: &str = "xlsx";

/// Default archive download name.
pub const C_ARCHIVE_NAME: &str = "updated_files.zip";

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Presets

/// Build the source workbook contract.
pub fn derive_default_source_layout() -> SpecSourceLayout {
    SpecSourceLayout {
        sheet_profile: C_SHEET_CUSTOMER_PROFILE.to_string(),
        sheet_devices: C_SHEET_DEVICES.to_string(),
        sheet_info: C_SHEET_INFO.to_string(),
        profile_section_header: C_PROFILE_SECTION_HEADER.to_string(),
        profile_labels: TUP_PROFILE_LABELS
            .iter()
            .map(|(label, field)| (label.to_string(), *field))
            .collect(),
        col_profile_label: N_COL_PROFILE_LABEL,
        col_profile_value: N_COL_PROFILE_VALUE,
        row_data_start: N_ROW_DATA_START,
        device_columns: TUP_DEVICE_COLUMNS.to_vec(),
        col_info_type: N_COL_INFO_TYPE,
    }
}

/// Build the `v1-1` template layout.
pub fn derive_default_template_layout() -> SpecTemplateLayout {
    let to_cells = |l_pairs: &[(EnumProfileField, &str)]| {
        l_pairs
            .iter()
            .map(|(field, cell)| (*field, cell.to_string()))
            .collect::<Vec<_>>()
    };
    SpecTemplateLayout {
        version: C_TEMPLATE_LAYOUT_VERSION.to_string(),
        sheet_name: None,
        profile_cells: to_cells(&[
            (EnumProfileField::Location, "D7"),
            (EnumProfileField::CompanyName, "D9"),
            (EnumProfileField::OfficialAccountName, "E19"),
            (EnumProfileField::BasicId, "K19"),
            (EnumProfileField::ProviderId, "D17"),
            (EnumProfileField::ProviderName, "D18"),
            (EnumProfileField::SpecialRequest, "D48"),
        ]),
        submit_date_cell: "K60".to_string(),
        device_cells: [
            (EnumDeviceField::Hwid, "D23"),
            (EnumDeviceField::Hwid, "D39"),
            (EnumDeviceField::BannerUrl, "D36"),
            (EnumDeviceField::BannerTitleTh, "F41"),
            (EnumDeviceField::BannerMessageTh, "F42"),
            (EnumDeviceField::BannerTitleEn, "F44"),
            (EnumDeviceField::BannerMessageEn, "F45"),
        ]
        .iter()
        .map(|(field, cell)| (*field, cell.to_string()))
        .collect(),
        location_owner_cell: "D24".to_string(),
        location_owner_placeholder: C_LOCATION_OWNER_PLACEHOLDER.to_string(),
    }
}

// #endregion
