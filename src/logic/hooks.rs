//! Per-operation customization hooks.
//!
//! A record type registers hooks in [`Record::hooks`]. The constructor used
//! to build a [`Hook`] fixes its signature shape (whether it wants the
//! request context and/or the decoded payload) and how its result is folded
//! back into a record-shaped value. Operations without a hook bind the raw
//! payload directly.

use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{CrudError, HookError, Result};
use crate::logic::registry;
use crate::model::{strip_defaults, to_object, value_kind, Record, RequestContext, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "Create"),
            Operation::Update => write!(f, "Update"),
        }
    }
}

/// Which inputs a hook receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookShape {
    /// Mutates a zero-valued record, no inputs
    Neither,
    Context,
    Payload,
    ContextAndPayload,
}

impl HookShape {
    pub fn takes_context(&self) -> bool {
        matches!(self, HookShape::Context | HookShape::ContextAndPayload)
    }

    pub fn takes_payload(&self) -> bool {
        matches!(self, HookShape::Payload | HookShape::ContextAndPayload)
    }
}

/// What a hook hands back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookReturn {
    /// The mutated record is the output
    Nothing,
    /// The mutated record is the output unless an error is reported
    Error,
    /// A transformed value replaces the record
    Value,
}

/// Results accepted from mutation hooks
pub trait HookResult {
    const RETURNS: HookReturn;

    fn into_result(self) -> Result<(), HookError>;
}

impl HookResult for () {
    const RETURNS: HookReturn = HookReturn::Nothing;

    fn into_result(self) -> Result<(), HookError> {
        Ok(())
    }
}

impl HookResult for Result<(), HookError> {
    const RETURNS: HookReturn = HookReturn::Error;

    fn into_result(self) -> Result<(), HookError> {
        self
    }
}

type HookFn = dyn Fn(&RequestContext, Option<Value>) -> Result<Value> + Send + Sync;

pub struct Hook<T> {
    shape: HookShape,
    returns: HookReturn,
    input_type: &'static str,
    output_type: &'static str,
    call: Arc<HookFn>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            returns: self.returns,
            input_type: self.input_type,
            output_type: self.output_type,
            call: Arc::clone(&self.call),
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("shape", &self.shape)
            .field("returns", &self.returns)
            .field("input_type", &self.input_type)
            .field("output_type", &self.output_type)
            .finish()
    }
}

fn decode_payload<I: DeserializeOwned>(payload: Option<Value>) -> Result<I> {
    serde_json::from_value(payload.unwrap_or(Value::Null)).map_err(|e| {
        CrudError::bind(format!(
            "payload does not match {}: {}",
            type_name::<I>(),
            e
        ))
    })
}

fn encode_output<O: Serialize>(output: &O) -> Result<Value> {
    serde_json::to_value(output).map_err(|e| {
        CrudError::Hook(HookError::new(format!(
            "hook output {} could not be encoded: {}",
            type_name::<O>(),
            e
        )))
    })
}

impl<T: Record> Hook<T> {
    fn from_parts<F>(
        shape: HookShape,
        returns: HookReturn,
        input_type: &'static str,
        output_type: &'static str,
        call: F,
    ) -> Self
    where
        F: Fn(&RequestContext, Option<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            shape,
            returns,
            input_type,
            output_type,
            call: Arc::new(call),
            _record: PhantomData,
        }
    }

    /// Mutate a fresh zero-valued record; no payload is decoded
    pub fn mutate<R, F>(f: F) -> Self
    where
        F: Fn(&mut T) -> R + Send + Sync + 'static,
        R: HookResult,
    {
        Self::from_parts(HookShape::Neither, R::RETURNS, "()", type_name::<T>(), move |_, _| {
            let mut record = T::default();
            f(&mut record).into_result()?;
            Ok(Value::Object(to_object(&record)?))
        })
    }

    pub fn mutate_with_context<R, F>(f: F) -> Self
    where
        F: Fn(&RequestContext, &mut T) -> R + Send + Sync + 'static,
        R: HookResult,
    {
        Self::from_parts(HookShape::Context, R::RETURNS, "()", type_name::<T>(), move |ctx, _| {
            let mut record = T::default();
            f(ctx, &mut record).into_result()?;
            Ok(Value::Object(to_object(&record)?))
        })
    }

    /// Decode the payload into `I` and fill a fresh zero-valued record from it
    pub fn bind<I, R, F>(f: F) -> Self
    where
        I: DeserializeOwned,
        F: Fn(&mut T, I) -> R + Send + Sync + 'static,
        R: HookResult,
    {
        Self::from_parts(
            HookShape::Payload,
            R::RETURNS,
            type_name::<I>(),
            type_name::<T>(),
            move |_, payload| {
                let input = decode_payload::<I>(payload)?;
                let mut record = T::default();
                f(&mut record, input).into_result()?;
                Ok(Value::Object(to_object(&record)?))
            },
        )
    }

    pub fn bind_with_context<I, R, F>(f: F) -> Self
    where
        I: DeserializeOwned,
        F: Fn(&RequestContext, &mut T, I) -> R + Send + Sync + 'static,
        R: HookResult,
    {
        Self::from_parts(
            HookShape::ContextAndPayload,
            R::RETURNS,
            type_name::<I>(),
            type_name::<T>(),
            move |ctx, payload| {
                let input = decode_payload::<I>(payload)?;
                let mut record = T::default();
                f(ctx, &mut record, input).into_result()?;
                Ok(Value::Object(to_object(&record)?))
            },
        )
    }

    /// Map the decoded payload to a value of the declared output type `O`
    pub fn transform<I, O, F>(f: F) -> Self
    where
        I: DeserializeOwned,
        O: Serialize,
        F: Fn(I) -> Result<O, HookError> + Send + Sync + 'static,
    {
        Self::from_parts(
            HookShape::Payload,
            HookReturn::Value,
            type_name::<I>(),
            type_name::<O>(),
            move |_, payload| {
                let output = f(decode_payload::<I>(payload)?)?;
                encode_output(&output)
            },
        )
    }

    pub fn transform_with_context<I, O, F>(f: F) -> Self
    where
        I: DeserializeOwned,
        O: Serialize,
        F: Fn(&RequestContext, I) -> Result<O, HookError> + Send + Sync + 'static,
    {
        Self::from_parts(
            HookShape::ContextAndPayload,
            HookReturn::Value,
            type_name::<I>(),
            type_name::<O>(),
            move |ctx, payload| {
                let output = f(ctx, decode_payload::<I>(payload)?)?;
                encode_output(&output)
            },
        )
    }
}

/// Hooks of one record type, at most one per operation
pub struct HookSet<T> {
    hooks: HashMap<Operation, Hook<T>>,
}

impl<T: Record> HookSet<T> {
    pub fn new() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    pub fn on(&mut self, operation: Operation, hook: Hook<T>) -> &mut Self {
        if self.hooks.insert(operation, hook).is_some() {
            warn!(
                "{} hook for {} registered twice, keeping the last one",
                operation,
                type_name::<T>()
            );
        }
        self
    }

    pub fn get(&self, operation: Operation) -> Option<&Hook<T>> {
        self.hooks.get(&operation)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl<T: Record> Default for HookSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A hook resolved for one operation of one record type
pub struct HookBinding<T> {
    pub operation: Operation,
    pub shape: HookShape,
    pub returns: HookReturn,
    pub input_type: &'static str,
    pub output_type: &'static str,
    hook: Hook<T>,
}

impl<T> Clone for HookBinding<T> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation,
            shape: self.shape,
            returns: self.returns,
            input_type: self.input_type,
            output_type: self.output_type,
            hook: self.hook.clone(),
        }
    }
}

impl<T> fmt::Debug for HookBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookBinding")
            .field("operation", &self.operation)
            .field("hook", &self.hook)
            .finish()
    }
}

/// Look up the hook for `operation`. `None` means raw binding.
pub fn bind<T: Record>(operation: Operation) -> Result<Option<HookBinding<T>>> {
    let hooks = registry::hook_set::<T>()?;
    Ok(hooks.get(operation).map(|hook| HookBinding {
        operation,
        shape: hook.shape,
        returns: hook.returns,
        input_type: hook.input_type,
        output_type: hook.output_type,
        hook: hook.clone(),
    }))
}

/// Canonical output of a dispatch: record-shaped objects keyed by logical names
#[derive(Debug, Clone, PartialEq)]
pub enum Folded {
    One(Row),
    Many(Vec<Row>),
}

/// Whether a request body is a JSON array, judged by its first token
pub fn peek_is_array(raw: &[u8]) -> bool {
    raw.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'[')
}

/// Parse a body into its elements: the array items in batch mode, the
/// whole value otherwise.
pub fn decode_elements(raw: &[u8], batch: bool) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| CrudError::bind(format!("malformed JSON payload: {}", e)))?;
    match (batch, value) {
        (true, Value::Array(items)) => Ok(items),
        (true, other) => Err(CrudError::bind(format!(
            "expected a JSON array, found {}",
            value_kind(&other)
        ))),
        (false, value) => Ok(vec![value]),
    }
}

/// Elements to dispatch. A single request for a hook that takes no payload
/// is not decoded at all.
pub fn payload_elements<T>(
    binding: Option<&HookBinding<T>>,
    raw: &[u8],
    batch: bool,
) -> Result<Vec<Value>> {
    let takes_payload = binding.map_or(true, |b| b.shape.takes_payload());
    if !batch && !takes_payload {
        return Ok(vec![Value::Null]);
    }
    decode_elements(raw, batch)
}

/// Produce the value to persist for one payload element
pub fn invoke_element<T: Record>(
    binding: Option<&HookBinding<T>>,
    operation: Operation,
    ctx: &RequestContext,
    element: Value,
) -> Result<Row> {
    let Some(binding) = binding else {
        return raw_bind::<T>(operation, element);
    };

    let payload = binding.shape.takes_payload().then_some(element);
    let output = (binding.hook.call)(ctx, payload)?;
    let object = match output {
        Value::Object(object) => object,
        other => {
            return Err(mismatch(binding, value_kind(&other).to_string()).into());
        }
    };

    match (operation, binding.returns) {
        (Operation::Create, HookReturn::Value) => {
            let record: T = serde_json::from_value(Value::Object(object))
                .map_err(|e| mismatch(binding, format!("an object that is not a record ({})", e)))?;
            to_object(&record)
        }
        (Operation::Update, HookReturn::Nothing | HookReturn::Error) => strip_defaults::<T>(object),
        _ => Ok(object),
    }
}

fn mismatch<T>(binding: &HookBinding<T>, found: String) -> HookError {
    HookError::OutputMismatch {
        operation: binding.operation.to_string(),
        type_name: type_name::<T>(),
        expected: binding.output_type,
        found,
    }
}

fn raw_bind<T: Record>(operation: Operation, element: Value) -> Result<Row> {
    match operation {
        Operation::Create => {
            let record: T = serde_json::from_value(element).map_err(|e| {
                CrudError::bind(format!("payload does not match {}: {}", type_name::<T>(), e))
            })?;
            to_object(&record)
        }
        Operation::Update => match element {
            Value::Object(object) => Ok(object),
            other => Err(CrudError::bind(format!(
                "update payload must be an object, found {}",
                value_kind(&other)
            ))),
        },
    }
}

/// Dispatch a whole request body. In batch mode each element triggers one
/// invocation and the first failure aborts the rest.
pub fn invoke<T: Record>(
    binding: Option<&HookBinding<T>>,
    operation: Operation,
    ctx: &RequestContext,
    raw: &[u8],
    batch: bool,
) -> Result<Folded> {
    let elements = payload_elements(binding, raw, batch)?;
    debug!(
        "Dispatching {} for {} over {} element(s), hook: {}",
        operation,
        type_name::<T>(),
        elements.len(),
        binding.map_or("none", |b| b.input_type)
    );

    let mut outputs = elements
        .into_iter()
        .map(|element| invoke_element(binding, operation, ctx, element))
        .collect::<Result<Vec<_>>>()?;

    if batch {
        Ok(Folded::Many(outputs))
    } else {
        outputs
            .pop()
            .map(Folded::One)
            .ok_or_else(|| CrudError::bind("empty payload"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDescriptor, FieldType};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Person {
        id: i64,
        name: String,
        age: i64,
    }

    #[derive(Debug, Deserialize)]
    struct PersonInput {
        name: String,
        age: i64,
    }

    impl Record for Person {
        const COLLECTION: &'static str = "hook_people";

        fn fields() -> Vec<FieldDescriptor> {
            vec![
                FieldDescriptor::new("id", FieldType::Integer).identifier(),
                FieldDescriptor::new("name", FieldType::Text),
                FieldDescriptor::new("age", FieldType::Integer),
            ]
        }

        fn hooks(hooks: &mut HookSet<Self>) {
            hooks
                .on(
                    Operation::Create,
                    Hook::bind(|person: &mut Person, input: PersonInput| {
                        person.name = input.name.to_uppercase();
                        person.age = input.age * 10;
                    }),
                )
                .on(
                    Operation::Update,
                    Hook::bind_with_context(
                        |ctx: &RequestContext, person: &mut Person, input: PersonInput| {
                            if input.age < 0 {
                                return Err(HookError::new("age must not be negative"));
                            }
                            person.name = format!("{}:{}", ctx.method, input.name);
                            person.age = input.age;
                            Ok(())
                        },
                    ),
                );
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Plain {
        id: i64,
        label: String,
    }

    impl Record for Plain {
        const COLLECTION: &'static str = "hook_plain";

        fn fields() -> Vec<FieldDescriptor> {
            vec![
                FieldDescriptor::new("id", FieldType::Integer).identifier(),
                FieldDescriptor::new("label", FieldType::Text),
            ]
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Stamped {
        id: i64,
        author: String,
    }

    impl Record for Stamped {
        const COLLECTION: &'static str = "hook_stamped";

        fn fields() -> Vec<FieldDescriptor> {
            vec![
                FieldDescriptor::new("id", FieldType::Integer).identifier(),
                FieldDescriptor::new("author", FieldType::Text),
            ]
        }

        fn hooks(hooks: &mut HookSet<Self>) {
            hooks
                .on(
                    Operation::Create,
                    Hook::mutate_with_context(|ctx: &RequestContext, record: &mut Stamped| {
                        record.author = ctx.user_id.clone().unwrap_or_default();
                    }),
                )
                .on(
                    Operation::Update,
                    Hook::transform(|value: Value| -> Result<Value, HookError> {
                        match value.get("author") {
                            Some(author) => Ok(json!({ "author": author })),
                            None => Ok(json!("no author")),
                        }
                    }),
                );
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::system()
    }

    #[test]
    fn test_binding_reports_signature_shape() {
        let create = bind::<Person>(Operation::Create).unwrap().unwrap();
        assert_eq!(create.shape, HookShape::Payload);
        assert_eq!(create.returns, HookReturn::Nothing);
        assert!(create.input_type.ends_with("PersonInput"));

        let update = bind::<Person>(Operation::Update).unwrap().unwrap();
        assert_eq!(update.shape, HookShape::ContextAndPayload);
        assert_eq!(update.returns, HookReturn::Error);

        assert!(bind::<Plain>(Operation::Create).unwrap().is_none());
    }

    #[test]
    fn test_create_hook_transforms_payload() {
        let binding = bind::<Person>(Operation::Create).unwrap();
        let folded = invoke(
            binding.as_ref(),
            Operation::Create,
            &ctx(),
            br#"{"name":"a","age":1}"#,
            false,
        )
        .unwrap();
        let Folded::One(row) = folded else { panic!("expected one output") };
        assert_eq!(Value::Object(row), json!({"id": 0, "name": "A", "age": 10}));
    }

    #[test]
    fn test_raw_bind_without_hook() {
        let raw = br#"[{"label":"x"},{"label":"y"}]"#;
        let folded = invoke::<Plain>(None, Operation::Create, &ctx(), raw, true).unwrap();
        let Folded::Many(rows) = folded else { panic!("expected many outputs") };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["label"], json!("y"));

        let err = invoke::<Plain>(None, Operation::Create, &ctx(), br#"{"label": 5}"#, false)
            .unwrap_err();
        assert!(matches!(err, CrudError::Bind(_)));
    }

    #[test]
    fn test_batch_aborts_on_first_hook_error() {
        let binding = bind::<Person>(Operation::Update).unwrap();
        let err = invoke(
            binding.as_ref(),
            Operation::Update,
            &ctx(),
            br#"[{"name":"a","age":1},{"name":"b","age":-1},{"name":"c","age":3}]"#,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, CrudError::Hook(HookError::Rejected(_))));
    }

    #[test]
    fn test_update_mutation_keeps_only_set_fields() {
        let binding = bind::<Person>(Operation::Update).unwrap();
        let element = json!({"name": "b", "age": 0});
        let row = invoke_element(binding.as_ref(), Operation::Update, &ctx(), element).unwrap();
        assert_eq!(Value::Object(row), json!({"name": "INTERNAL:b"}));
    }

    #[test]
    fn test_context_only_hook_skips_payload_decoding() {
        let binding = bind::<Stamped>(Operation::Create).unwrap();
        assert_eq!(binding.as_ref().unwrap().shape, HookShape::Context);
        let folded = invoke(binding.as_ref(), Operation::Create, &ctx(), b"", false).unwrap();
        let expected = json!({"id": 0, "author": "system"});
        assert_eq!(folded, Folded::One(expected.as_object().unwrap().clone()));

        let folded =
            invoke(binding.as_ref(), Operation::Create, &ctx(), b"[{}, {}, {}]", true).unwrap();
        let Folded::Many(rows) = folded else { panic!("expected many outputs") };
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_mismatched_output_fails_fast() {
        let binding = bind::<Stamped>(Operation::Update).unwrap();
        let raw = br#"[{"author":"x"},{"id":2}]"#;
        let err = invoke(binding.as_ref(), Operation::Update, &ctx(), raw, true).unwrap_err();
        match err {
            CrudError::Hook(HookError::OutputMismatch { found, .. }) => {
                assert_eq!(found, "a string")
            }
            other => panic!("expected output mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_peek_is_array() {
        assert!(peek_is_array(b"  \n[1]"));
        assert!(!peek_is_array(br#"{"a":[1]}"#));
        assert!(!peek_is_array(b""));
    }
}
