//! Models: typed views of the build the daemon can produce on request.
//!
//! Only capability types can be requested. A capability type declares what
//! a model exposes without fixing a concrete data shape, which lets the
//! daemon evolve its representation. Requests for a concrete type are
//! rejected before anything is dispatched.

use crate::action::ConsumerAction;
use crate::dispatcher::{Dispatcher, Prepared};
use crate::error::{ConnectionError, ToolingError};
use crate::handler::ResultHandler;
use crate::launcher::LongRunningOperation;
use crate::operation::{entry_points, OperationOptions};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelShape {
    /// Declares behaviour only
    Capability,
    /// A fixed data layout
    Concrete,
}

/// Name and shape of a model as the daemon knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelType {
    name: &'static str,
    shape: ModelShape,
}

impl ModelType {
    pub const fn capability(name: &'static str) -> Self {
        Self {
            name,
            shape: ModelShape::Capability,
        }
    }

    pub const fn concrete(name: &'static str) -> Self {
        Self {
            name,
            shape: ModelShape::Concrete,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> ModelShape {
        self.shape
    }

    pub fn is_capability(&self) -> bool {
        self.shape == ModelShape::Capability
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type that can be fetched from the daemon.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct ProjectOutline { name: String, children: Vec<String> }
///
/// impl Model for ProjectOutline {
///     const TYPE: ModelType = ModelType::capability("ProjectOutline");
/// }
///
/// let outline: ProjectOutline = connection.get_model()?;
/// ```
pub trait Model: DeserializeOwned + Send + 'static {
    const TYPE: ModelType;
}

pub(crate) fn ensure_capability(model_type: &ModelType) -> Result<(), ToolingError> {
    if model_type.is_capability() {
        Ok(())
    } else {
        Err(ToolingError::invalid_argument(format!(
            "Cannot fetch a model of type '{}' as this type is not a capability type.",
            model_type.name()
        )))
    }
}

/// Configures and runs one model fetch.
pub struct ModelBuilder<T> {
    dispatcher: Dispatcher,
    options: OperationOptions,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> ModelBuilder<T> {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            options: OperationOptions::default(),
            _model: PhantomData,
        }
    }

    /// Fetch the model, blocking until the daemon answers.
    pub fn get(self) -> Result<T, ToolingError> {
        self.prepare().run()
    }

    /// Fetch the model in the background; `handler` is called on an
    /// executor thread.
    pub fn get_with<H>(self, handler: H)
    where
        H: ResultHandler<T> + 'static,
    {
        self.prepare().run_with(Box::new(handler))
    }

    pub async fn fetch(self) -> Result<T, ToolingError> {
        self.prepare().run_async().await
    }

    fn prepare(self) -> Prepared<T> {
        let params = self
            .options
            .to_parameters(entry_points::MODEL_BUILDER, self.dispatcher.connection().clone())
            .model_type(T::TYPE)
            .build();

        let action = ConsumerAction::new(params, |connection, params| {
            let value = connection.fetch_model(&T::TYPE, params)?;
            serde_json::from_value::<T>(value).map_err(|e| {
                ConnectionError::UnexpectedResult(format!(
                    "model '{}' could not be decoded: {}",
                    T::TYPE,
                    e
                ))
            })
        });
        let transformer = self.dispatcher.transformer(|display_name| {
            format!(
                "Could not fetch model of type '{}' using {}.",
                T::TYPE,
                display_name
            )
        });

        Prepared::new(self.dispatcher, action, transformer)
    }
}

impl<T> LongRunningOperation for ModelBuilder<T> {
    fn options_mut(&mut self) -> &mut OperationOptions {
        &mut self.options
    }
}
