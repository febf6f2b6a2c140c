//! `trino-mcp check` command implementation.
//!
//! Validates the effective configuration and checks the Trino coordinator:
//! - Configuration loading and cross-field validation
//! - Settings that work but are probably not what was meant
//! - Coordinator reachability and the configured default catalog/schema

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use trino_mcp_core::ServerConfig;
use trino_mcp_engine::{EngineConnection, QueryEngine, TrinoEngine, metadata};

use super::ConfigArgs;

/// Arguments for `trino-mcp check`.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Only validate the configuration; do not contact Trino.
    #[arg(long)]
    pub offline: bool,
}

// ============================================================================
// Check Result Types
// ============================================================================

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    pub category: String,
    pub message: String,
}

impl CheckFinding {
    fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category: category.into(),
            message: message.into(),
        }
    }

    fn warning(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category: category.into(),
            message: message.into(),
        }
    }

    fn info(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            category: category.into(),
            message: message.into(),
        }
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn add(&mut self, finding: CheckFinding) {
        self.findings.push(finding);
    }

    fn extend(&mut self, findings: impl IntoIterator<Item = CheckFinding>) {
        self.findings.extend(findings);
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Print human-readable summary.
    pub fn print_summary(&self) {
        for (severity, title) in [
            (Severity::Error, "❌ Errors"),
            (Severity::Warning, "⚠️  Warnings"),
            (Severity::Info, "ℹ️  Info"),
        ] {
            let mut group: Vec<_> = self.findings.iter().filter(|f| f.severity == severity).collect();
            if group.is_empty() {
                continue;
            }
            group.sort_by(|a, b| a.category.cmp(&b.category));
            println!("\n{title} ({}):", group.len());
            println!("{}", "─".repeat(60));
            for finding in group {
                print_finding(finding);
            }
        }

        println!();
        println!("{}", "═".repeat(60));
        let (errors, warnings) = (self.count(Severity::Error), self.count(Severity::Warning));
        if errors == 0 && warnings == 0 {
            println!("✅ All checks passed!");
        } else {
            println!("Summary: {errors} error(s), {warnings} warning(s)");
        }
    }
}

fn print_finding(finding: &CheckFinding) {
    let icon = match finding.severity {
        Severity::Error => "✗",
        Severity::Warning => "⚠",
        Severity::Info => "ℹ",
    };
    println!("  {} [{}]: {}", icon, finding.category, finding.message);
}

// ============================================================================
// Configuration Checks
// ============================================================================

/// Checks that need nothing but the configuration itself.
pub fn check_config(config: &ServerConfig) -> Vec<CheckFinding> {
    let mut findings = Vec::new();

    if config.engine.get_password().is_some() && config.engine.http_scheme == "http" {
        findings.push(CheckFinding::warning(
            "engine",
            "a password is configured but http_scheme is 'http'; credentials are sent in clear text",
        ));
    }

    if config.engine.catalog.is_none() {
        findings.push(CheckFinding::warning(
            "engine",
            "no default catalog; tools will need explicit catalog arguments and queries must use qualified names",
        ));
    }

    if config.engine.request_timeout_seconds == 0 || config.engine.query_timeout_seconds == 0 {
        findings.push(CheckFinding::error("engine", "timeouts must be greater than zero"));
    } else if config.engine.query_timeout_seconds < config.engine.request_timeout_seconds {
        findings.push(CheckFinding::warning(
            "engine",
            "query_timeout_seconds is shorter than request_timeout_seconds",
        ));
    }

    if config.mcp.is_stdio() && config.http_api_enabled() {
        findings.push(CheckFinding::info(
            "http_api",
            format!(
                "HTTP API enabled alongside stdio on {}:{}",
                config.http_api.host,
                config.http_api_port()
            ),
        ));
    }

    if config.mcp.is_sse() && config.mcp.host == "0.0.0.0" {
        findings.push(CheckFinding::warning(
            "mcp",
            "SSE transport listens on all interfaces and has no authentication",
        ));
    }

    findings
}

// ============================================================================
// Engine Checks
// ============================================================================

/// Check the coordinator and the configured defaults.
pub async fn check_engine(config: &ServerConfig) -> Vec<CheckFinding> {
    let mut findings = Vec::new();
    let engine = match TrinoEngine::new(config.engine.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            findings.push(CheckFinding::error("engine", format!("cannot build client: {e}")));
            return findings;
        }
    };

    match engine.ping().await {
        Ok(info) if info.starting => findings.push(CheckFinding::warning(
            "engine",
            format!("{} is still starting", config.engine.base_url()),
        )),
        Ok(info) => findings.push(CheckFinding::info(
            "engine",
            format!(
                "reached {} (version {}, environment {})",
                config.engine.base_url(),
                info.node_version.as_deref().unwrap_or("unknown"),
                info.environment.as_deref().unwrap_or("unknown"),
            ),
        )),
        Err(e) => {
            findings.push(CheckFinding::error(
                "engine",
                format!("cannot reach {}: {e}", config.engine.base_url()),
            ));
            return findings;
        }
    }

    let Some(catalog) = config.engine.catalog.as_deref() else {
        return findings;
    };
    let cancel = CancellationToken::new();
    let conn = match engine.connect(&engine.default_target()).await {
        Ok(conn) => conn,
        Err(e) => {
            findings.push(CheckFinding::error("engine", format!("cannot open a connection: {e}")));
            return findings;
        }
    };

    match metadata::list_catalogs(conn.as_ref(), &cancel).await {
        Ok(catalogs) if !catalogs.contains(catalog) => findings.push(CheckFinding::error(
            "catalog",
            format!("default catalog '{catalog}' does not exist"),
        )),
        Ok(_) => {
            if let Some(schema) = config.engine.schema.as_deref() {
                match metadata::list_schemas(conn.as_ref(), catalog, &cancel).await {
                    Ok(schemas) if !schemas.contains(schema) => findings.push(CheckFinding::error(
                        "schema",
                        format!("default schema '{catalog}.{schema}' does not exist"),
                    )),
                    Ok(_) => {}
                    Err(e) => findings.push(CheckFinding::warning("schema", format!("cannot list schemas: {e}"))),
                }
            }
        }
        Err(e) => findings.push(CheckFinding::warning("catalog", format!("cannot list catalogs: {e}"))),
    }
    conn.close().await;

    findings
}

pub async fn execute(config_args: &ConfigArgs, args: CheckArgs) -> Result<()> {
    let mut results = CheckResults::default();

    match config_args.load() {
        Ok(config) => {
            results.add(CheckFinding::info("config", "configuration is valid"));
            results.extend(check_config(&config));
            if !args.offline {
                results.extend(check_engine(&config).await);
            }
        }
        Err(e) => results.add(CheckFinding::error("config", format!("{e:#}"))),
    }

    results.print_summary();
    if results.has_errors() {
        anyhow::bail!("configuration check failed");
    }
    Ok(())
}
