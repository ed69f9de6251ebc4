use super::{Catalog, TestCase, TestCaseType, TestCategory};
use crate::config::CategoryFilter;

/// One dispatchable case with the group it was declared in.
#[derive(Debug, Clone, Copy)]
pub struct TestExecutionData<'a> {
    pub group_name: &'a str,
    pub case: &'a TestCase,
}

/// Select cases from the catalog in stable declaration order.
///
/// Prerequisite-type cases never dispatch on their own. A name filter that
/// matches exactly one case short-circuits every other filter; otherwise
/// category and group combine as a logical AND.
pub fn filter_cases<'a>(
    catalog: &'a Catalog,
    test_name: Option<&str>,
    category: CategoryFilter,
    group: Option<&str>,
) -> Vec<TestExecutionData<'a>> {
    let mut selected: Vec<TestExecutionData<'a>> = catalog
        .groups
        .iter()
        .flat_map(|g| {
            g.cases
                .iter()
                .filter(|c| c.case_type == TestCaseType::Default)
                .map(move |c| TestExecutionData {
                    group_name: g.name.as_str(),
                    case: c,
                })
        })
        .collect();

    if let Some(name) = test_name {
        selected.retain(|d| d.case.name == name);
        if selected.len() == 1 {
            return selected;
        }
    }

    selected.retain(|d| category_admits(category, d.case.category));
    if let Some(group) = group {
        selected.retain(|d| d.group_name.eq_ignore_ascii_case(group));
    }
    selected
}

/// The category lattice: WopiCore is included by every filter; the two
/// client categories exclude each other.
pub fn category_admits(filter: CategoryFilter, category: TestCategory) -> bool {
    match filter {
        CategoryFilter::All => true,
        CategoryFilter::WopiCore => category == TestCategory::WopiCore,
        CategoryFilter::OfficeNativeClient => matches!(
            category,
            TestCategory::WopiCore | TestCategory::OfficeNativeClient
        ),
        CategoryFilter::OfficeOnline => {
            matches!(category, TestCategory::WopiCore | TestCategory::OfficeOnline)
        }
    }
}
