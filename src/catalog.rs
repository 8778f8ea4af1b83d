//! Built-in field catalog for quote documents.
//!
//! Keys of repeatable categories carry the placeholder index `1`; the
//! collection manager strips it when it builds the entry template.

use serde::Serialize;

use crate::form::{ControlKind, SelectOption};
use crate::view_store::DocumentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Incoterms,
    WeeksAfterPo,
    /// Derived display rendered with a trailing `%`.
    Percent,
    /// Derived display without decoration.
    Computed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryField {
    pub key: String,
    pub label: String,
    pub optional: bool,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecialLists {
    pub incoterms: Vec<SelectOption>,
    pub weeks_after_po: Vec<SelectOption>,
}

type FieldRow = (&'static str, &'static str, FieldKind);

const CATEGORY_ORDER: [&str; 12] = [
    "Quote Information",
    "System Name",
    "Customer Contact Information",
    "Alliance Contact Information",
    "Previous Projects",
    "Customer Specifications",
    "Cost Sheet",
    "System Description",
    "System Layout",
    "OEE Metrics",
    "Project Milestones",
    "Shipping Information",
];
const BUDGETARY_CATEGORIES: [&str; 8] = [
    "Quote Information",
    "System Name",
    "Customer Contact Information",
    "Alliance Contact Information",
    "Previous Projects",
    "Customer Specifications",
    "Cost Sheet",
    "System Layout",
];
const REPEATABLE_CATEGORIES: [&str; 3] =
    ["Customer Specifications", "Cost Sheet", "System Description"];
const OPTIONAL_CATEGORIES: [&str; 2] = ["Previous Projects", "Customer Specifications"];

const QUOTE_INFORMATION: [FieldRow; 2] = [
    ("data.quoteNumber", "Quote Number", FieldKind::Text),
    ("data.proposalDate", "Quote Due Date", FieldKind::Text),
];
const SYSTEM_NAME: [FieldRow; 1] = [("data.systemName", "System Name", FieldKind::Text)];
const CUSTOMER_CONTACT: [FieldRow; 8] = [
    ("data.customercontact.companyname", "Company Name", FieldKind::Text),
    ("data.customercontact.name", "Customer Contact Name", FieldKind::Text),
    ("data.customercontact.telephone", "Customer Contact Telephone", FieldKind::Text),
    ("data.customercontact.email", "Customer Contact Email", FieldKind::Text),
    ("data.customercontact.title", "Customer Contact Title", FieldKind::Text),
    ("data.customercontact.address", "Company Street Address", FieldKind::Text),
    ("data.customercontact.address2", "Company City/State/Zip", FieldKind::Text),
    ("data.customercontact.logo", "Customer Logo", FieldKind::Text),
];
const ALLIANCE_CONTACT: [FieldRow; 4] = [
    ("data.alliancecontact.name", "Sales Contact", FieldKind::Text),
    ("data.alliancecontact.title", "Sales Title", FieldKind::Text),
    ("data.alliancecontact.cell", "Sales Cell", FieldKind::Text),
    ("data.alliancecontact.email", "Sales Email", FieldKind::Text),
];
const PREVIOUS_PROJECTS: [FieldRow; 1] =
    [("data.previousProject.quote", "Previous Quote", FieldKind::Text)];
const CUSTOMER_SPECIFICATIONS: [FieldRow; 1] = [(
    "data.customerSpecifications.cr.1",
    "Customer Specifications",
    FieldKind::Text,
)];
const COST_SHEET: [FieldRow; 2] = [
    ("data.costSheet.link.1", "Cost Sheet", FieldKind::Text),
    ("data.costSheet.total.1", "Cost Sheet Total", FieldKind::Text),
];
const SYSTEM_DESCRIPTION: [FieldRow; 2] = [
    ("data.systemDesc.name.1", "Zone Name", FieldKind::Text),
    ("data.systemDesc.description.1", "Zone Description", FieldKind::Text),
];
const SYSTEM_LAYOUT: [FieldRow; 5] = [
    ("data.systemLayout.elevation", "Elevation", FieldKind::Text),
    ("data.systemLayout.end", "End", FieldKind::Text),
    ("data.systemLayout.iso", "Iso", FieldKind::Text),
    ("data.systemLayout.top", "Top", FieldKind::Text),
    ("data.systemLayout.title", "Title", FieldKind::Text),
];
const OEE_METRICS: [FieldRow; 13] = [
    ("data.oee.runtime", "Run Time", FieldKind::Text),
    ("data.oee.planneddowntime", "Planned Downtime", FieldKind::Text),
    ("data.oee.unplanneddowntime", "Unplanned Downtime", FieldKind::Text),
    ("data.oee.total_parts_produced", "Total [Parts] Produced", FieldKind::Text),
    ("data.oee.nominalcycletime", "Nominal Cycle Time", FieldKind::Text),
    ("data.oee.totalscrap", "Total Scrap ([Parts])", FieldKind::Text),
    ("data.oee.parts", "Parts", FieldKind::Text),
    ("data.oee.oee", "OEE", FieldKind::Percent),
    ("data.oee.capacity", "Capacity", FieldKind::Computed),
    ("data.oee.totalproduced", "Total Produced", FieldKind::Computed),
    ("data.oee.performance", "Performance", FieldKind::Percent),
    ("data.oee.quality", "Quality", FieldKind::Percent),
    ("data.oee.availability", "Availability", FieldKind::Percent),
];
const PROJECT_MILESTONES: [FieldRow; 6] = [
    ("data.projectMilestones.customerKickoff", "Customer Kickoff", FieldKind::WeeksAfterPo),
    ("data.projectMilestones.designAcceptance", "Design Acceptance", FieldKind::WeeksAfterPo),
    ("data.projectMilestones.buildStart", "Build Start", FieldKind::WeeksAfterPo),
    ("data.projectMilestones.commissioningStart", "Commissioning Start", FieldKind::WeeksAfterPo),
    ("data.projectMilestones.fatStart", "FAT Start", FieldKind::WeeksAfterPo),
    ("data.projectMilestones.delivery", "Delivery", FieldKind::WeeksAfterPo),
];
const SHIPPING_INFORMATION: [FieldRow; 1] =
    [("data.shipping.incoterms", "Shipping Terms", FieldKind::Incoterms)];

const INCOTERMS: [(&str, &str); 11] = [
    ("EXW", "EXW - Ex Works"),
    ("FCA", "FCA - Free Carrier"),
    ("FAS", "FAS - Free Alongside Ship"),
    ("FOB", "FOB - Free on Board"),
    ("CFR", "CFR - Cost and Freight"),
    ("CIF", "CIF - Cost, Insurance and Freight"),
    ("CPT", "CPT - Carriage Paid To"),
    ("CIP", "CIP - Carriage and Insurance Paid To"),
    ("DAP", "DAP - Delivered at Place"),
    ("DPU", "DPU - Delivered at Place Unloaded"),
    ("DDP", "DDP - Delivered Duty Paid"),
];
const WEEKS_AFTER_PO: u32 = 75;

#[derive(Debug, Clone, Default)]
pub struct Catalog;

impl Catalog {
    pub fn quote() -> Self {
        Catalog
    }

    pub fn categories(&self, doc_type: DocumentType) -> Vec<String> {
        CATEGORY_ORDER
            .iter()
            .filter(|name| match doc_type {
                DocumentType::Budgetary => BUDGETARY_CATEGORIES.contains(*name),
                DocumentType::Final => true,
            })
            .map(|name| name.to_string())
            .collect()
    }

    /// Empty for unknown categories.
    pub fn category_fields(&self, category: &str) -> Vec<CategoryField> {
        let optional = OPTIONAL_CATEGORIES.contains(&category);
        category_rows(category)
            .iter()
            .map(|(key, label, kind)| CategoryField {
                key: key.to_string(),
                label: label.to_string(),
                optional,
                kind: *kind,
            })
            .collect()
    }

    pub fn category_can_add(&self, category: &str) -> bool {
        REPEATABLE_CATEGORIES.contains(&category)
    }

    pub fn special_lists(&self) -> SpecialLists {
        SpecialLists {
            incoterms: incoterm_options(),
            weeks_after_po: week_options(),
        }
    }
}

fn category_rows(category: &str) -> &'static [FieldRow] {
    match category {
        "Quote Information" => &QUOTE_INFORMATION,
        "System Name" => &SYSTEM_NAME,
        "Customer Contact Information" => &CUSTOMER_CONTACT,
        "Alliance Contact Information" => &ALLIANCE_CONTACT,
        "Previous Projects" => &PREVIOUS_PROJECTS,
        "Customer Specifications" => &CUSTOMER_SPECIFICATIONS,
        "Cost Sheet" => &COST_SHEET,
        "System Description" => &SYSTEM_DESCRIPTION,
        "System Layout" => &SYSTEM_LAYOUT,
        "OEE Metrics" => &OEE_METRICS,
        "Project Milestones" => &PROJECT_MILESTONES,
        "Shipping Information" => &SHIPPING_INFORMATION,
        _ => &[],
    }
}

pub fn control_kind(kind: FieldKind) -> ControlKind {
    match kind {
        FieldKind::Text => ControlKind::Text,
        FieldKind::Incoterms => ControlKind::Select {
            options: incoterm_options(),
        },
        FieldKind::WeeksAfterPo => ControlKind::Select {
            options: week_options(),
        },
        FieldKind::Percent => ControlKind::Computed { percent: true },
        FieldKind::Computed => ControlKind::Computed { percent: false },
    }
}

fn incoterm_options() -> Vec<SelectOption> {
    INCOTERMS
        .iter()
        .map(|(code, label)| SelectOption {
            value: code.to_string(),
            label: label.to_string(),
        })
        .collect()
}

fn week_options() -> Vec<SelectOption> {
    (0..WEEKS_AFTER_PO)
        .map(|week| SelectOption {
            value: week.to_string(),
            label: format!("Week {week}"),
        })
        .collect()
}
