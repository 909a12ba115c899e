//! Handler traits.
//!
//! - `Handler<T>`: typed, one implementation per task type.
//! - `DynHandler`: object-safe, stored in the registry. Takes raw JSON
//!   arguments and returns a JSON result.
//! - `TypedHandler<T, H>` erases a `Handler<T>` into a `DynHandler`.
//! - `FnHandler` turns an async closure into a `DynHandler`.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;

use super::context::TaskContext;
use super::task::Task;
use crate::domain::HandlerError;

#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, ctx: &TaskContext, task: T) -> Result<T::Output, HandlerError>;
}

#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(
        &self,
        ctx: &TaskContext,
        arguments: &[Value],
    ) -> Result<Value, HandlerError>;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(
        &self,
        ctx: &TaskContext,
        arguments: &[Value],
    ) -> Result<Value, HandlerError> {
        let task: T = serde_json::from_value(Value::Array(arguments.to_vec()))
            .map_err(|e| HandlerError::invalid_arguments(format!("{}: {e}", T::NAME)))?;
        let output = self.handler.handle(ctx, task).await?;
        serde_json::to_value(output)
            .map_err(|e| HandlerError::permanent(format!("result encode: {e}")))
    }
}

pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> DynHandler for FnHandler<F>
where
    F: Fn(TaskContext, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle_dyn(
        &self,
        ctx: &TaskContext,
        arguments: &[Value],
    ) -> Result<Value, HandlerError> {
        (self.f)(ctx.clone(), arguments.to_vec()).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::domain::ErrorKind;
    use serde_json::json;

    #[tokio::test]
    async fn positional_arguments_decode_into_named_fields() {
        let handler = TypedHandler::<Echo, _>::new(EchoHandler);
        let out = handler
            .handle_dyn(&context(Echo::NAME), &[json!("demo")])
            .await
            .unwrap();
        assert_eq!(out, json!("echo: demo"));
    }

    #[tokio::test]
    async fn no_argument_task_accepts_empty_list() {
        let handler = TypedHandler::<Noop, _>::new(NoopHandler);
        let out = handler.handle_dyn(&context(Noop::NAME), &[]).await.unwrap();
        assert_eq!(out, Value::Null);
    }

    #[tokio::test]
    async fn wrong_arguments_are_invalid_arguments() {
        let handler = TypedHandler::<Echo, _>::new(EchoHandler);
        let err = handler
            .handle_dyn(&context(Echo::NAME), &[json!(42)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);

        let err = handler
            .handle_dyn(&context(Echo::NAME), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn closures_are_handlers() {
        let handler = FnHandler::new(|ctx: TaskContext, args: Vec<Value>| async move {
            Ok::<_, HandlerError>(json!({ "attempt": ctx.attempt, "args": args }))
        });
        let out = handler
            .handle_dyn(&context("closure"), &[json!(1), json!("two")])
            .await
            .unwrap();
        assert_eq!(out, json!({ "attempt": 1, "args": [1, "two"] }));
    }
}
