//! Producer/consumer bridge for row streams.

use std::future::Future;

use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Producer side of a [`produce`] stream.
pub struct Sink<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Sink<T> {
    /// Wait until the consumer takes the previous item. `false` once the
    /// consumer is gone; the producer should stop then.
    pub async fn send(&self, item: T) -> bool {
        self.tx.send(item).await.is_ok()
    }
}

/// Run `producer` on a background task and hand its items over one at a time.
///
/// The channel holds a single item, so the producer only reads the next row
/// once the consumer has taken the previous one. Dropping the returned stream
/// stops the producer at its next send.
pub fn produce<T, F, Fut>(producer: F) -> BoxStream<'static, T>
where
    T: Send + 'static,
    F: FnOnce(Sink<T>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(producer(Sink { tx }));
    ReceiverStream::new(rx).boxed()
}

/// [`produce`] over an existing stream.
pub fn pump<T, S>(source: S) -> BoxStream<'static, T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    produce(|sink| async move {
        let mut source = Box::pin(source);
        while let Some(item) = source.next().await {
            if !sink.send(item).await {
                tracing::debug!("stream consumer dropped, stopping producer");
                break;
            }
        }
    })
}
