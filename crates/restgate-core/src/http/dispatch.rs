//! Hand-off of decoded response bodies
//!
//! Turning raw JSON into domain objects is not the client's job. Every
//! successfully decoded body is forwarded verbatim to a [`Dispatch`]
//! implementation and whatever it returns becomes the call's result.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Error, Result};

/// Receives every decoded success body
pub trait Dispatch: Send + Sync + 'static {
    /// Result handed back to the caller
    type Output: Clone + Send + Sync + 'static;

    fn dispatch(&self, value: Value) -> Result<Self::Output>;
}

/// Returns the decoded JSON unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDispatch;

impl Dispatch for PassthroughDispatch {
    type Output = Value;

    fn dispatch(&self, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Deserializes the decoded JSON into `T`
pub struct DeserializeDispatch<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> DeserializeDispatch<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for DeserializeDispatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DeserializeDispatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeserializeDispatch")
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Dispatch for DeserializeDispatch<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Output = T;

    fn dispatch(&self, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| Error::Dispatch {
            message: format!("failed to decode into {}", std::any::type_name::<T>()),
            source: Some(e.into()),
        })
    }
}
