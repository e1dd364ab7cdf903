//! Buffering decorator: a durable second tier behind the in-memory cache.
//!
//! On an in-memory miss the buffer is asked before the producer runs; a
//! buffered value is put back into memory. Freshly produced values are
//! written through to the buffer. Buffer failures never fail a request.

use super::traits::{CachedProducer, DataBuffer};
use async_trait::async_trait;
use neonbee_core::{CacheKey, DataContext, DataMap, DataQuery, DataRequest, NeonBeeResult};
use std::sync::Arc;

/// How the write-through to the buffer is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferWriteMode {
    /// The caller waits for the write, which bounds pending work.
    #[default]
    Await,
    /// The write runs as a detached task; the caller returns immediately.
    Detached,
}

/// A [`CachedProducer`] whose secondary tier is a [`DataBuffer`].
pub struct Buffered<P, B> {
    inner: P,
    buffer: Arc<B>,
    write_mode: BufferWriteMode,
}

impl<P, B> Buffered<P, B>
where
    P: CachedProducer,
    B: DataBuffer<P::Value>,
{
    pub fn new(inner: P, buffer: Arc<B>) -> Self {
        Self {
            inner,
            buffer,
            write_mode: BufferWriteMode::default(),
        }
    }

    pub fn with_write_mode(mut self, write_mode: BufferWriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn write_mode(&self) -> BufferWriteMode {
        self.write_mode
    }
}

async fn write_through<V, B>(
    buffer: &B,
    producer_type: &str,
    key: &CacheKey,
    value: &V,
    context: &DataContext,
) where
    B: DataBuffer<V> + ?Sized,
{
    if let Err(e) = buffer.write_to_buffer(key, value, context).await {
        tracing::warn!(
            producer_type = %producer_type,
            error = %e,
            "Buffer write failed, value stays in memory only"
        );
    }
}

#[async_trait]
impl<P, B> CachedProducer for Buffered<P, B>
where
    P: CachedProducer,
    B: DataBuffer<P::Value>,
{
    type Value = P::Value;

    fn producer_type(&self) -> &str {
        self.inner.producer_type()
    }

    async fn compute_cache_key(
        &self,
        query: &DataQuery,
        context: &DataContext,
    ) -> NeonBeeResult<Option<CacheKey>> {
        self.inner.compute_cache_key(query, context).await
    }

    async fn require_data_for_caching(
        &self,
        query: &DataQuery,
        context: &DataContext,
    ) -> NeonBeeResult<Vec<DataRequest>> {
        self.inner.require_data_for_caching(query, context).await
    }

    async fn retrieve_data_to_cache(
        &self,
        query: &DataQuery,
        required: &DataMap,
        context: &DataContext,
    ) -> NeonBeeResult<Self::Value> {
        self.inner
            .retrieve_data_to_cache(query, required, context)
            .await
    }

    async fn retrieved_data_to_cache(
        &self,
        key: &CacheKey,
        value: &Self::Value,
        context: &DataContext,
    ) -> NeonBeeResult<()> {
        // The write-through does not depend on the wrapped hook succeeding.
        let notified = self.inner.retrieved_data_to_cache(key, value, context).await;

        match self.write_mode {
            BufferWriteMode::Await => {
                write_through(&*self.buffer, self.producer_type(), key, value, context).await;
            }
            BufferWriteMode::Detached => {
                let buffer = Arc::clone(&self.buffer);
                let producer_type = self.producer_type().to_string();
                let key = key.clone();
                let value = value.clone();
                let context = context.clone();
                tokio::spawn(async move {
                    write_through(&*buffer, &producer_type, &key, &value, &context).await;
                });
            }
        }
        notified
    }

    async fn filter_data_from_cache(
        &self,
        query: &DataQuery,
        value: Self::Value,
        context: &DataContext,
    ) -> Self::Value {
        self.inner.filter_data_from_cache(query, value, context).await
    }

    async fn read_secondary(&self, key: &CacheKey, context: &DataContext) -> Option<Self::Value> {
        match self.buffer.read_from_buffer(key, context).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) if e.is_buffer_not_found() => {}
            Err(e) => {
                tracing::warn!(
                    producer_type = %self.producer_type(),
                    error = %e,
                    "Buffer read failed, treating as miss"
                );
            }
        }
        self.inner.read_secondary(key, context).await
    }
}
