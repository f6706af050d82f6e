//! Saved-settings reconciliation.
//!
//! The library snapshots the persistable options into `options.json` in
//! the download root. Before a run, each setting that differs from the
//! snapshot is confirmed interactively; declining restores the saved
//! value. `--yes` (and any non-interactive session) keeps the new values
//! without asking.

use std::io;

use console::style;
use dialoguer::Confirm;
use humblesync::app::SavedOptions;
use humblesync::format::Platform;
use humblesync::Options;
use tracing::warn;

/// Diffs `options` against the saved snapshot, prompts per changed
/// setting, and persists the result.
pub fn reconcile_saved(options: &mut Options, assume_yes: bool) -> io::Result<()> {
    let root = options.download_folder.clone();

    if let Some(saved) = SavedOptions::load(&root) {
        for diff in saved.diff(&options.snapshot()) {
            let keep_new = assume_yes || confirm_new_value(diff.name, &diff.saved, &diff.current);
            if keep_new {
                continue;
            }
            match diff.name {
                "dedup" => options.dedup = saved.dedup,
                "bundleFolders" => options.bundle_folders = saved.bundle_folders,
                "parallel" => options.parallel = saved.parallel,
                "format" => options.format = saved.format.clone(),
                "platform" => {
                    options.platform = saved
                        .platform
                        .iter()
                        .filter_map(|p| {
                            let parsed = Platform::parse(p);
                            if parsed.is_none() {
                                warn!(platform = %p, "Ignoring unknown platform in saved options");
                            }
                            parsed
                        })
                        .collect();
                }
                other => warn!(setting = other, "Unknown setting in saved options diff"),
            }
        }
    }

    options.snapshot().save(&root)
}

fn confirm_new_value(name: &str, saved: &str, current: &str) -> bool {
    let prompt = format!(
        "{} differs from saved\n\tsaved: {}\n\tnew:   {}\nUse new value?",
        style(name).yellow(),
        saved,
        current
    );
    // A closed or non-interactive terminal keeps the new value.
    Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()
        .unwrap_or(true)
}
