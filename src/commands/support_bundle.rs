use std::sync::Arc;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::{info, warn};

use edge_diag::bundle::{BundleBuilder, BundleRequest, ServiceSelection};
use edge_diag::catalog::Service;
use edge_diag::config::load_file;
use edge_diag::{ClusterClient, KubeCluster};

use crate::cli::BundleArgs;

fn selection(ops_service: &str) -> Result<ServiceSelection> {
    if ops_service.eq_ignore_ascii_case("auto") {
        return Ok(ServiceSelection::Auto);
    }
    let service: Service = ops_service.parse().map_err(anyhow::Error::msg)?;
    Ok(ServiceSelection::Services(vec![service]))
}

pub async fn run(args: BundleArgs) -> Result<()> {
    let file = load_file(args.config.as_deref())?;
    let request = BundleRequest {
        services: selection(&args.ops_service)?,
        log_age_seconds: args.log_age_seconds.max(0),
        bundle_dir: args.bundle_dir,
    };

    let cluster = KubeCluster::connect(args.context.as_deref(), file.api_timeout())
        .await
        .context("Cannot load kubeconfig")?;
    let client: Arc<dyn ClusterClient> = Arc::new(cluster);
    let builder = BundleBuilder::new(client).with_progress(!args.no_progress);

    let cancel = builder.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("support_bundle_interrupted");
            cancel.cancel();
        }
    });

    let result = builder.build(&request).await?;
    info!(services = ?result.services, "support_bundle_complete");

    for warning in &result.warnings {
        eprintln!("{} {}", "warning:".yellow(), warning);
    }
    println!(
        "{} {}",
        "Support bundle written to".green(),
        result.bundle_path.display().bold()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_parsing() {
        assert_eq!(selection("AUTO").unwrap(), ServiceSelection::Auto);
        assert_eq!(
            selection("broker").unwrap(),
            ServiceSelection::Services(vec![Service::Broker])
        );
        assert!(selection("nope").is_err());
    }
}
