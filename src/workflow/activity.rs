//! Activity definition
//!
//! An activity is a named user function whose result is memoized per
//! `(workflow, step ordinal, input)`. The function itself is stored
//! type-erased; its payloads go through the activity's codec.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, Json};
use crate::error::Error;

type ActivityBody<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, Error>> + Send + Sync>;

/// A user function promoted into a replayable workflow step
pub struct Activity<I, O> {
    name: String,
    codec: Arc<dyn Codec<I, O>>,
    body: ActivityBody<I, O>,
}

impl<I, O> Clone for Activity<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            codec: self.codec.clone(),
            body: self.body.clone(),
        }
    }
}

impl<I, O> Activity<I, O>
where
    I: Serialize + DeserializeOwned + Send + 'static,
    O: Serialize + DeserializeOwned + Send + 'static,
{
    /// Promote a function under a stable activity name
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, Error>> + Send + 'static,
    {
        let body: ActivityBody<I, O> = Arc::new(move |input| Box::pin(body(input)));
        Self {
            name: name.into(),
            codec: Arc::new(Json),
            body,
        }
    }

    /// Swap the payload codec
    pub fn with_codec(mut self, codec: Arc<dyn Codec<I, O>>) -> Self {
        self.codec = codec;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn codec(&self) -> &Arc<dyn Codec<I, O>> {
        &self.codec
    }

    pub(crate) fn invoke(&self, input: I) -> BoxFuture<'static, Result<O, Error>> {
        (self.body)(input)
    }
}
