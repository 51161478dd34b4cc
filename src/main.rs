//! vSphere Problem Detector
//!
//! Runs the vSphere configuration checks against the current cluster,
//! either once or periodically.
//!
//! ```text
//!   Infrastructure ──► cloud config ──► credentials ──► vCenter login
//!                                                            │
//!   Nodes / StorageClasses / PVs ─────────────────► CheckRunner (6 checks)
//!                                                            │
//!                                           report (text/json/yaml) + metrics
//! ```

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vsphere_problem_detector::{
    cluster, vsphere, CheckConfig, CheckKind, CheckReport, CheckRunner, Error, KubeCluster,
    PathEscaperRef, RestSession, Result, SystemdEscape, UnitNameEscaper, VSphereConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EscaperKind {
    /// In-process unit-name escaping
    Builtin,
    /// Shell out to `systemd-escape --path`
    Systemd,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// vSphere Problem Detector - checks a cluster's vSphere configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Read the cloud provider config from this file instead of the cluster
    #[arg(long, env = "VMWARE_CONFIG")]
    vmware_config: Option<PathBuf>,

    /// Timeout of a single vSphere call, in seconds
    #[arg(long, env = "VMWARE_TIMEOUT_SECS", default_value = "10")]
    vmware_timeout_secs: u64,

    /// Timeout of a single Kubernetes call, in seconds
    #[arg(long, env = "KUBERNETES_TIMEOUT_SECS", default_value = "10")]
    kubernetes_timeout_secs: u64,

    /// Path escaper used for mount path length checks
    #[arg(long, env = "ESCAPER", value_enum, default_value = "builtin")]
    escaper: EscaperKind,

    /// Re-run all checks with this period; 0 runs them once
    #[arg(long, env = "INTERVAL_SECS", default_value = "0")]
    interval_secs: u64,

    /// Report format
    #[arg(long, env = "OUTPUT", value_enum, default_value = "text")]
    output: OutputFormat,

    /// Metrics server bind address, used in interval mode
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8444")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn vsphere_timeout(&self) -> Duration {
        Duration::from_secs(self.vmware_timeout_secs)
    }

    fn escaper(&self) -> PathEscaperRef {
        match self.escaper {
            EscaperKind::Builtin => Arc::new(UnitNameEscaper),
            EscaperKind::Systemd => Arc::new(SystemdEscape::new()),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting vSphere Problem Detector");
    info!("  Version: {}", vsphere_problem_detector::VERSION);
    info!("  Escaper: {:?}", args.escaper);
    info!("  vSphere timeout: {:?}", args.vsphere_timeout());
    info!("  Interval: {}s", args.interval_secs);

    let cluster =
        KubeCluster::try_default(Duration::from_secs(args.kubernetes_timeout_secs)).await?;
    let runner = CheckRunner::new(
        args.escaper(),
        CheckConfig {
            vsphere_timeout: args.vsphere_timeout(),
        },
    );

    if args.interval_secs == 0 {
        let report = run_once(&args, &cluster, &runner).await?;
        print_report(&report, args.output)?;
        if !report.is_success() {
            return Ok(ExitCode::FAILURE);
        }
        return Ok(ExitCode::SUCCESS);
    }

    run_periodically(&args, &cluster, &runner).await?;
    info!("Detector shutdown complete");
    Ok(ExitCode::SUCCESS)
}

/// Load config, log in, and run every check once
async fn run_once(args: &Args, cluster: &KubeCluster, runner: &CheckRunner) -> Result<CheckReport> {
    let config = match &args.vmware_config {
        Some(path) => VSphereConfig::from_file(path)?,
        None => cluster::load_vsphere_config(cluster).await?,
    };
    let credentials = cluster::credentials(cluster, &config).await?;

    let session = vsphere::call(
        args.vsphere_timeout(),
        "login",
        RestSession::login(&config, &credentials),
    )
    .await
    .map_err(|e| e.context(format!("failed to connect to vCenter {}", config.vcenter())))?;

    let report = runner.run(cluster, &session, &config).await;
    for outcome in report.failed() {
        if let Err(e) = &outcome.result {
            error!("{} failed: {}", outcome.kind, e);
        }
    }

    if let Err(e) = vsphere::call(args.vsphere_timeout(), "logout", session.logout()).await {
        warn!("Failed to log out of vCenter: {}", e);
    }
    Ok(report)
}

async fn run_periodically(args: &Args, cluster: &KubeCluster, runner: &CheckRunner) -> Result<()> {
    let metrics = Arc::new(Metrics::register(prometheus::default_registry())?);

    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            shutdown.cancel();
        }
    });

    let interval = Duration::from_secs(args.interval_secs);
    loop {
        match run_once(args, cluster, runner).await {
            Ok(report) => {
                metrics.observe(&report);
                if let Err(e) = print_report(&report, args.output) {
                    error!("Failed to print report: {}", e);
                }
            }
            Err(e) => {
                error!("Check run failed: {}", e);
                metrics.observe_failure(chrono::Utc::now());
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Ok(())
}

fn print_report(report: &CheckReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.summary())?),
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&report.summary())
                .map_err(|e| Error::Internal(format!("failed to render report: {}", e)))?;
            print!("{}", yaml);
        }
    }
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,kube=info,reqwest=info", level))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Metrics
// =============================================================================

struct Metrics {
    check_passed: prometheus::GaugeVec,
    check_duration: prometheus::GaugeVec,
    last_run: prometheus::Gauge,
    run_failed: prometheus::Gauge,
}

impl Metrics {
    fn register(registry: &prometheus::Registry) -> Result<Self> {
        use prometheus::{Gauge, GaugeVec, Opts};

        let failed = |e: prometheus::Error| Error::Internal(format!("failed to register metric: {}", e));
        let metrics = Self {
            check_passed: GaugeVec::new(
                Opts::new(
                    "vsphere_problem_detector_check_passed",
                    "Whether the last run of a check passed (1) or failed (0)",
                ),
                &["check"],
            )
            .map_err(failed)?,
            check_duration: GaugeVec::new(
                Opts::new(
                    "vsphere_problem_detector_check_duration_seconds",
                    "Duration of the last run of a check",
                ),
                &["check"],
            )
            .map_err(failed)?,
            last_run: Gauge::new(
                "vsphere_problem_detector_last_run_timestamp_seconds",
                "Start time of the last run",
            )
            .map_err(failed)?,
            run_failed: Gauge::new(
                "vsphere_problem_detector_run_failed",
                "Whether the last run failed before any check could run",
            )
            .map_err(failed)?,
        };

        registry
            .register(Box::new(metrics.check_passed.clone()))
            .map_err(failed)?;
        registry
            .register(Box::new(metrics.check_duration.clone()))
            .map_err(failed)?;
        registry
            .register(Box::new(metrics.last_run.clone()))
            .map_err(failed)?;
        registry
            .register(Box::new(metrics.run_failed.clone()))
            .map_err(failed)?;
        Ok(metrics)
    }

    fn observe(&self, report: &CheckReport) {
        for outcome in &report.outcomes {
            let labels = [outcome.kind.name()];
            self.check_passed
                .with_label_values(&labels)
                .set(if outcome.passed() { 1.0 } else { 0.0 });
            self.check_duration
                .with_label_values(&labels)
                .set(outcome.duration.as_secs_f64());
        }
        self.run_failed.set(0.0);
        self.last_run.set(report.started_at.timestamp() as f64);
    }

    /// Config, credential or login failure: no check ran, so none passed
    fn observe_failure(&self, at: chrono::DateTime<chrono::Utc>) {
        for kind in CheckKind::ALL {
            self.check_passed.with_label_values(&[kind.name()]).set(0.0);
        }
        self.run_failed.set(1.0);
        self.last_run.set(at.timestamp() as f64);
    }
}

async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let mut response = Response::new(Body::empty());
            match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    match encoder.encode(&prometheus::gather(), &mut buffer) {
                        Ok(()) => {
                            if let Ok(value) = encoder.format_type().parse() {
                                response.headers_mut().insert("Content-Type", value);
                            }
                            *response.body_mut() = Body::from(buffer);
                        }
                        Err(e) => {
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            *response.body_mut() = Body::from(e.to_string());
                        }
                    }
                }
                "/healthz" => *response.body_mut() = Body::from("ok"),
                _ => {
                    *response.status_mut() = StatusCode::NOT_FOUND;
                    *response.body_mut() = Body::from("not found");
                }
            }
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
