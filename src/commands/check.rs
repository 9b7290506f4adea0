use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing::info;

use edge_diag::catalog::Service;
use edge_diag::config::{CheckContext, FileConfig, load_file};
use edge_diag::engine::{CheckEngine, RunRequest, validate_readiness};
use edge_diag::render::{RenderOptions, render_report};
use edge_diag::{ClusterClient, DetailLevel, KubeCluster};

use crate::cli::{CheckArgs, ServiceArg};

fn services_for(arg: ServiceArg) -> Vec<Service> {
    match arg {
        ServiceArg::Broker => vec![Service::Broker],
        ServiceArg::Connector => vec![Service::Connector],
        ServiceArg::Diagnostics => vec![Service::Diagnostics],
        ServiceArg::Opcua => vec![Service::Opcua],
        ServiceArg::All => Vec::new(),
    }
}

/// The config file bounds each API call; only `--timeout-seconds` bounds the run.
fn check_context(args: &CheckArgs, file: &FileConfig) -> CheckContext {
    let mut ctx = CheckContext::from_file(file).with_broker_stats(args.stats);
    if let Some(namespace) = &args.namespace {
        ctx = ctx.with_namespace(namespace.clone());
    }
    if let Some(seconds) = args.timeout_seconds {
        ctx = ctx.with_deadline(Instant::now() + Duration::from_secs(seconds));
    }
    ctx
}

pub async fn run(args: CheckArgs) -> Result<()> {
    let file = load_file(args.config.as_deref())?;
    let detail = DetailLevel::try_from(args.detail_level).map_err(anyhow::Error::msg)?;

    let cluster = KubeCluster::connect(args.context.as_deref(), file.api_timeout())
        .await
        .context("Cannot load kubeconfig")?;
    // Unreachable clusters fail here, not once per check.
    let version = cluster
        .server_version()
        .await
        .context("Cannot reach the Kubernetes API server")?;
    info!(version = %version, "cluster_connected");

    let ctx = check_context(&args, &file);
    let strict = args.strict || file.pre_deployment.strict;
    let request = RunRequest {
        title: Some(format!("Edge services health check (Kubernetes {version})")),
        services: services_for(args.service),
        pre_deployment: args.pre,
        post_deployment: args.post,
        as_list: args.as_list,
        detail,
        resource_kinds: args.resources,
        resource_name: args.resource_name,
        pre_config: file.pre_deployment,
        ..Default::default()
    };

    let engine = CheckEngine::new(&cluster, ctx);
    let report = engine.run(&request).await;

    if args.as_list {
        let opts = RenderOptions {
            detail,
            color: !args.no_color,
        };
        print!("{}", render_report(&report, &opts));
    } else {
        println!("{}", report.to_json()?);
    }

    if strict {
        validate_readiness(&report.pre_deployment, true)?;
    }
    Ok(())
}

/* ============================= TESTS ============================= */
