use anyhow::Context;
use tracing::info;

use crate::storage::Store;
use crate::App;

pub async fn run(app: App) -> anyhow::Result<()> {
    let store = app.service.store();
    store.ping().await.context("store is unreachable")?;
    info!("store is reachable");

    app.shutdown.cancel();
    store.close().await;
    Ok(())
}
