//! Redirects around the project selection page.

use parcell_core::traits::Navigator;
use parcell_core::types::QueryArgs;

use crate::url::build_url;

pub const PROJECT_SELECT_PAGE: &str = "project_select.html";
pub const DEFAULT_LANDING_PAGE: &str = "index.html";

/// Return the `project` argument, or send the user to the selection page.
///
/// When no non-empty project is given, `next` is set to the current path so
/// the selection page can come back here, and `None` is returned.
pub fn require_project(args: &mut QueryArgs, nav: &dyn Navigator) -> Option<String> {
    if let Some(project) = args.text("project").filter(|p| !p.is_empty()) {
        return Some(project.to_string());
    }
    args.set("next", nav.pathname());
    nav.navigate(&build_url(PROJECT_SELECT_PAGE, args));
    None
}

/// Go back to the page recorded in `next` (or the landing page) with
/// `project` filled in and `next` removed.
pub fn return_project(url_args: &QueryArgs, project: &str, nav: &dyn Navigator) {
    let landing = match url_args.text("next") {
        Some(next) if !next.is_empty() => next,
        _ => DEFAULT_LANDING_PAGE,
    };
    let mut args: QueryArgs = url_args
        .iter()
        .filter(|(key, _)| *key != "next")
        .map(|(key, value)| (key, value.clone()))
        .collect();
    args.set("project", project);
    nav.navigate(&build_url(landing, &args));
}
