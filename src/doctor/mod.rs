use crate::auth::TokenStore;
use crate::backends::BackendRegistry;
use crate::config::Config;
use anyhow::Result;

/// Outcome of one environment check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            detail: detail.into(),
        }
    }
}

/// Probe every backend and the Drive sign-in state.
///
/// The remote compile API is only contacted when a key is configured.
pub async fn collect(config: &Config, registry: &BackendRegistry) -> Vec<Check> {
    let mut checks = Vec::new();

    checks.push(if cfg!(feature = "js-runtime") {
        Check::pass("javascript", "embedded QuickJS runtime")
    } else {
        Check::fail("javascript", "built without the js-runtime feature")
    });

    checks.push(match registry.interpreter().ensure_ready().await {
        Ok(info) => Check::pass("python", format!("{} ({})", info.version, info.program)),
        Err(err) => Check::fail("python", format!("{err:#}")),
    });

    let judge0 = registry.judge0();
    checks.push(match judge0.require_key() {
        Err(err) => Check::fail("c/c++", err.to_string()),
        Ok(_) => match judge0.check_connection().await {
            Ok(count) => Check::pass("c/c++", format!("Judge0 reachable, {count} languages available")),
            Err(err) => Check::fail("c/c++", format!("{err:#}")),
        },
    });

    checks.push(match config.drive.client_id.as_deref() {
        Some(id) if !id.trim().is_empty() => Check::pass("drive client", "Google client id configured"),
        _ => Check::fail(
            "drive client",
            "set drive.client_id or CODEBUDDY_GOOGLE_CLIENT_ID to enable Drive storage",
        ),
    });

    checks.push(match TokenStore::new(config.token_path()).load_valid() {
        Ok(Some(token)) => Check::pass(
            "drive session",
            format!("signed in, token valid for {}s", token.remaining_secs()),
        ),
        Ok(None) => Check::fail("drive session", "not signed in (run `codebuddy drive login`)"),
        Err(err) => Check::fail("drive session", format!("{err:#}")),
    });

    checks
}

pub async fn run(config: &Config, registry: &BackendRegistry) -> Result<()> {
    println!("🩺 CodeBuddy Doctor");
    println!("  Config: {}", config.config_path.display());
    println!("  Workspace: {}", config.workspace_dir.display());

    let checks = collect(config, registry).await;
    for check in &checks {
        let mark = if check.ok { "✅" } else { "❌" };
        println!("  {mark} {}: {}", check.name, check.detail);
    }

    let failing = checks.iter().filter(|c| !c.ok).count();
    if failing == 0 {
        println!("  All checks passed");
    } else {
        println!("  {failing} of {} checks need attention", checks.len());
    }
    Ok(())
}
