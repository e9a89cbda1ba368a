use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Program text for the remote interpreter that defines a function named `entrypoint`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Callable {
    pub source: String,
    pub entrypoint: String,
}

/// A unit of work: the callable plus its positional and keyword arguments.
///
/// The orchestrator never looks inside a payload, it only ships it to the instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub callable: Callable,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Payload {
    pub fn new(source: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            callable: Callable {
                source: source.into(),
                entrypoint: entrypoint.into(),
            },
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn to_blob(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(blob)?)
    }
}
