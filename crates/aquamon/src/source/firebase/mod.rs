mod client;
mod stream;

pub use client::FirebaseSource;

use std::sync::Arc;

use anyhow::Context;
use linkme::distributed_slice;

use crate::source;

#[distributed_slice(source::REGISTRY)]
fn init_firebase(ctx: &source::SourceContext) -> source::SourceFactoryResult {
    let firebase_config = if let Some(c) = &ctx.config.source.firebase {
        c
    } else {
        return Ok(None);
    };

    let source =
        FirebaseSource::new(firebase_config).context("Failed to create Firebase client")?;
    Ok(Some(Arc::new(source)))
}
