//! The `backends` command.

use tandem_core::Config;

/// List registered backends with their availability and known models.
pub async fn handle_backends(config: &Config) -> anyhow::Result<()> {
    let registry = config.build_registry();

    println!("{:<8} {:<10} {:<8} {:<20} {}", "NAME", "STATUS", "DEFAULT", "MODEL", "KNOWN MODELS");
    println!("{}", "-".repeat(90));

    for kind in registry.kinds() {
        let Some(backend) = registry.lookup(kind) else {
            continue;
        };
        let status = if backend.is_available().await {
            "ready"
        } else {
            "missing"
        };
        let default = if kind == registry.default_kind() { "*" } else { "" };
        let model = config
            .default_model(kind)
            .or_else(|| backend.models().first().map(|m| m.to_string()))
            .unwrap_or_default();

        println!(
            "{:<8} {:<10} {:<8} {:<20} {}",
            kind.as_str(),
            status,
            default,
            model,
            backend.models().join(", ")
        );
    }

    Ok(())
}
