use std::sync::LazyLock;

/// Defines the application version.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    format_version(
        env!("IMAGE_VERSION"),
        option_env!("VERGEN_GIT_SHA"),
        option_env!("VERGEN_GIT_DIRTY") == Some("true"),
    )
});

fn format_version(version: &str, sha: Option<&str>, dirty: bool) -> String {
    let sha = sha.map(|sha| &sha[..sha.len().min(8)]).unwrap_or("unknown");
    format!("{version}-{sha}{}", if dirty { "-dirty" } else { "" })
}
