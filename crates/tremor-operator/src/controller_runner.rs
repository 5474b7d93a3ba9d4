//! Controller runner - builds the ChaosExperiment controller future

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use tremor_chaos::controller::{error_policy, reconcile, Context, ControllerConfig};
use tremor_common::crd::ChaosExperiment;
use tremor_common::CrdRegistry;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// so the API server closes idle watches before the client times out.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the ChaosExperiment controller.
///
/// Owned Jobs and ConfigMaps re-trigger their experiment, so a finishing job
/// is noticed without waiting for the requeue interval.
pub fn build_chaos_controller(
    client: Client,
    registry: Arc<CrdRegistry>,
    config: ControllerConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(
        Context::builder(client.clone(), registry)
            .config(config)
            .build(),
    );
    let experiments: Api<ChaosExperiment> = Api::all(client.clone());
    let watcher = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    tracing::info!("- ChaosExperiment controller");

    Box::pin(
        Controller::new(experiments, watcher())
            .owns(Api::<Job>::all(client.clone()), watcher())
            .owns(Api::<ConfigMap>::all(client), watcher())
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("ChaosExperiment")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
