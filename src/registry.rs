/**
 * INVOCATION REGISTRY - Class tables, instance store, lifecycle synthesis
 *
 * RÔLE :
 * Binds (class name, function name+signature) to invocable targets and
 * holds live object instances keyed by instance id. Registration is
 * idempotent per (class, fully-qualified-name) key. Constructors
 * registered via `register_constructor` make four lifecycle operations
 * available on `class_name`: `__create__`, `__createNamed__`,
 * `__getNamed__`, `__delete__`. They are not stored as ordinary static
 * functions; `call` resolves them directly against the constructor table
 * so the registry never needs a closure that captures a reference back to
 * itself.
 *
 * FONCTIONNEMENT :
 * Rust has no variadic templates, so where the original expresses bound
 * invocables as a clone-and-bind `Function` class hierarchy, this registry
 * stores them as a single polymorphic function type: boxed closures behind
 * `Arc<dyn Fn(...) -> Result<Value, AgentError> + Send + Sync>`. Instances
 * are type-erased behind `Box<dyn Any + Send + Sync>`; callers never get
 * the raw object back, only invoke functions bound to it.
 */
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::signature::{base_name, signature_of};
use crate::wire::RequestDoc;

/// A live, type-erased instance. Shared via `Arc` so every bound invocable
/// clone can reach it without the registry itself staying locked during a
/// call.
pub type InstanceHandle = Arc<Mutex<Box<dyn Any + Send + Sync>>>;

/// Unbound, per-class invocable: given an instance handle and the raw
/// argument `Value`, produce a result. Cloning a template and binding it to
/// a fresh instance is how the registry realizes "clone + bind" without an
/// inheritance hierarchy.
pub type MemberTemplate =
    Arc<dyn Fn(InstanceHandle, Value) -> Result<Value, AgentError> + Send + Sync>;

/// A member template already bound to one instance.
pub type BoundFn = Arc<dyn Fn(Value) -> Result<Value, AgentError> + Send + Sync>;

/// A class-level static invocable (plain static functions only; the four
/// synthesized lifecycle operations are resolved separately, see `call`).
pub type StaticFn = Arc<dyn Fn(Value) -> Result<Value, AgentError> + Send + Sync>;

/// Application-supplied object factory: unpacks constructor arguments and
/// returns the freshly built, type-erased instance.
pub type ConstructorFn =
    Arc<dyn Fn(Value) -> Result<Box<dyn Any + Send + Sync>, AgentError> + Send + Sync>;

/// Parameter descriptor attached via `register_meta`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParamMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Full descriptor for one `name+sig` entry, stored in a class's meta table
/// and surfaced verbatim in class-info.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionMeta {
    pub description: String,
    pub params: Vec<ParamMeta>,
    #[serde(rename = "ret")]
    pub ret_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ret_description: Option<String>,
}

struct ClassRecord {
    member_templates: HashMap<String, MemberTemplate>,
    static_fns: HashMap<String, StaticFn>,
    /// Registered constructors keyed by their own argument signature (the
    /// suffix `__create__` would carry, e.g. `""` or `"-number"`).
    ctors: HashMap<String, ConstructorFn>,
    meta: HashMap<String, FunctionMeta>,
}

impl ClassRecord {
    fn new() -> Self {
        Self {
            member_templates: HashMap::new(),
            static_fns: HashMap::new(),
            ctors: HashMap::new(),
            meta: HashMap::new(),
        }
    }

    fn has_ctors(&self) -> bool {
        !self.ctors.is_empty()
    }
}

struct InstanceRecord {
    class_name: String,
    bound_fns: HashMap<String, BoundFn>,
}

/// The registry. All mutation happens from the single-threaded dispatch
/// loop (see agent::AgentRuntime), so these locks never contend in
/// practice; they exist so the registry can be shared behind an `Arc`
/// without threading a `&mut` through every layer.
pub struct Registry {
    classes: RwLock<HashMap<String, ClassRecord>>,
    instances: RwLock<HashMap<String, InstanceRecord>>,
    named_instances: RwLock<HashMap<String, String>>,
    isolated_owners: RwLock<HashMap<String, HashSet<(String, String)>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            named_instances: RwLock::new(HashMap::new()),
            isolated_owners: RwLock::new(HashMap::new()),
        }
    }

    fn class_mut<'a>(
        classes: &'a mut HashMap<String, ClassRecord>,
        class_name: &str,
    ) -> &'a mut ClassRecord {
        classes
            .entry(class_name.to_string())
            .or_insert_with(ClassRecord::new)
    }

    /// Registers a constructor whose own argument signature is `arg_sig`
    /// (as produced by `signature::signature_of`, e.g. `"-number"` or
    /// `""`). Idempotent: registering the same `(class, arg_sig)` twice
    /// overwrites the earlier entry, matching "registration primitives are
    /// idempotent". Makes `__create__`, `__createNamed__`, `__getNamed__`
    /// and `__delete__` invocable on `class_name`.
    pub fn register_constructor(&self, class_name: &str, arg_sig: &str, ctor: ConstructorFn) {
        let mut classes = self.classes.write();
        let class = Self::class_mut(&mut classes, class_name);
        class.ctors.insert(arg_sig.to_string(), ctor);
        debug!(class = class_name, sig = arg_sig, "registered constructor");
    }

    pub fn register_member_function(
        &self,
        class_name: &str,
        name_and_sig: &str,
        template: MemberTemplate,
    ) {
        let mut classes = self.classes.write();
        let class = Self::class_mut(&mut classes, class_name);
        class
            .member_templates
            .insert(name_and_sig.to_string(), template);
        debug!(class = class_name, function = name_and_sig, "registered member function");
    }

    pub fn register_static_function(&self, class_name: &str, name_and_sig: &str, f: StaticFn) {
        let mut classes = self.classes.write();
        let class = Self::class_mut(&mut classes, class_name);
        class.static_fns.insert(name_and_sig.to_string(), f);
        debug!(class = class_name, function = name_and_sig, "registered static function");
    }

    pub fn register_meta(&self, class_name: &str, name_and_sig: &str, meta: FunctionMeta) {
        let mut classes = self.classes.write();
        let class = Self::class_mut(&mut classes, class_name);
        class.meta.insert(name_and_sig.to_string(), meta);
    }

    pub fn get_classes(&self) -> Vec<String> {
        self.classes.read().keys().cloned().collect()
    }

    pub fn get_member_functions(&self, class_name: &str) -> Vec<String> {
        self.classes
            .read()
            .get(class_name)
            .map(|c| c.member_templates.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Full `name+sig` entries on the class's static table, including the
    /// four synthesized lifecycle operations, which live in the same
    /// table as ordinary static functions.
    pub fn get_static_functions(&self, class_name: &str) -> Vec<String> {
        let classes = self.classes.read();
        let Some(class) = classes.get(class_name) else {
            return Vec::new();
        };
        let mut out: Vec<String> = class.static_fns.keys().cloned().collect();
        for arg_sig in class.ctors.keys() {
            let tail = arg_sig.trim_start_matches('-');
            out.push(format!("__create__{arg_sig}"));
            out.push(format!("__createNamed__-string{tail}"));
        }
        if class.has_ctors() {
            out.push("__getNamed__-string".to_string());
            out.push("__delete__-string".to_string());
        }
        out
    }

    pub fn get_instances(&self, class_name: &str) -> Vec<String> {
        self.named_instances
            .read()
            .iter()
            .filter(|(_, c)| c.as_str() == class_name)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn get_meta_data(&self, class_name: &str) -> Value {
        let classes = self.classes.read();
        let Some(class) = classes.get(class_name) else {
            return Value::Object(serde_json::Map::new());
        };
        serde_json::to_value(&class.meta).unwrap_or(Value::Object(serde_json::Map::new()))
    }

    /// Distinct base (unsignatured) static function names for one class,
    /// including the four synthesized lifecycle names when the class has
    /// at least one registered constructor. Used by the topic mapper to
    /// build the static subscription set and by class-info.
    pub fn static_base_names(&self, class_name: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let classes = self.classes.read();
        if let Some(class) = classes.get(class_name) {
            for full in class.static_fns.keys() {
                let base = base_name(full);
                if seen.insert(base) {
                    out.push(base.to_string());
                }
            }
            if class.has_ctors() {
                for name in ["__create__", "__createNamed__", "__getNamed__", "__delete__"] {
                    if seen.insert(name) {
                        out.push(name.to_string());
                    }
                }
            }
        }
        out
    }

    pub fn member_base_names(&self, class_name: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        if let Some(class) = self.classes.read().get(class_name) {
            for full in class.member_templates.keys() {
                let base = base_name(full);
                if seen.insert(base) {
                    out.push(base.to_string());
                }
            }
        }
        out
    }

    pub fn class_name_of(&self, instance_id: &str) -> Option<String> {
        self.instances
            .read()
            .get(instance_id)
            .map(|i| i.class_name.clone())
    }

    pub fn is_instance(&self, id: &str) -> bool {
        self.instances.read().contains_key(id)
    }

    pub fn is_class(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// Resolves and invokes the request in place, mutating `req` into its
    /// reply (§4.5). `context` is resolved against instances first, then
    /// classes. Any panic from a target is caught and reported as a
    /// `TargetFailure`, Rust's nearest analogue to "catch any exception
    /// raised by the target".
    pub fn call(&self, req: &mut RequestDoc) {
        let args = req.positional_args();

        let outcome = if self.is_instance(&req.context) {
            let sig = signature_of(&args);
            let full_method = format!("{}{}", req.method, sig);
            self.call_instance(&req.context, &full_method, req.data.clone())
        } else if self.is_class(&req.context) {
            self.call_on_class(&req.context, &req.method, &args, req.data.clone())
        } else {
            Err(AgentError::ContextNotFound(req.context.clone()))
        };

        match outcome {
            Ok(value) => req.set_result(value),
            Err(e) => req.set_error(e.wire_message()),
        }
    }

    fn call_on_class(
        &self,
        class_name: &str,
        method: &str,
        args: &[Value],
        data: Value,
    ) -> Result<Value, AgentError> {
        match method {
            "__create__" => {
                let ctor = self.find_ctor(class_name, &signature_of(args))?;
                self.do_create(class_name, ctor, data, None)
            }
            "__createNamed__" => {
                let id = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AgentError::TargetFailure(
                            "__createNamed__ requires a string id as first argument".into(),
                        )
                    })?
                    .to_string();
                let rest_sig = signature_of(&args[1..]);
                let ctor = self.find_ctor(class_name, &rest_sig)?;
                let rest = reshift_positional(&data, 1);
                self.do_create(class_name, ctor, rest, Some(id))
            }
            "__getNamed__" => {
                let id = args.first().and_then(Value::as_str).ok_or_else(|| {
                    AgentError::TargetFailure("__getNamed__ requires a string id".into())
                })?;
                self.do_get_named(id)
            }
            "__delete__" => {
                let id = args.first().and_then(Value::as_str).ok_or_else(|| {
                    AgentError::TargetFailure("__delete__ requires a string id".into())
                })?;
                Ok(Value::Bool(self.do_delete(id)))
            }
            _ => {
                let sig = signature_of(args);
                let full_method = format!("{method}{sig}");
                self.call_static(class_name, &full_method, data)
            }
        }
    }

    fn find_ctor(&self, class_name: &str, arg_sig: &str) -> Result<ConstructorFn, AgentError> {
        let classes = self.classes.read();
        classes
            .get(class_name)
            .and_then(|c| c.ctors.get(arg_sig))
            .cloned()
            .ok_or_else(|| AgentError::FunctionNotFound(format!("__create__{arg_sig}")))
    }

    fn call_instance(
        &self,
        instance_id: &str,
        full_method: &str,
        data: Value,
    ) -> Result<Value, AgentError> {
        let bound = {
            let instances = self.instances.read();
            let instance = instances
                .get(instance_id)
                .ok_or_else(|| AgentError::ContextNotFound(instance_id.to_string()))?;
            instance.bound_fns.get(full_method).cloned()
        };
        let Some(bound) = bound else {
            return Err(AgentError::FunctionNotFound(full_method.to_string()));
        };
        invoke_caught(move || bound(data))
    }

    fn call_static(&self, class_name: &str, full_method: &str, data: Value) -> Result<Value, AgentError> {
        let f = {
            let classes = self.classes.read();
            let class = classes
                .get(class_name)
                .ok_or_else(|| AgentError::ContextNotFound(class_name.to_string()))?;
            class.static_fns.get(full_method).cloned()
        };
        let Some(f) = f else {
            return Err(AgentError::FunctionNotFound(full_method.to_string()));
        };
        invoke_caught(move || f(data))
    }

    fn do_create(
        &self,
        class_name: &str,
        ctor: ConstructorFn,
        data: Value,
        explicit_id: Option<String>,
    ) -> Result<Value, AgentError> {
        if let Some(id) = &explicit_id {
            if self.instances.read().contains_key(id) {
                return Ok(Value::String(id.clone()));
            }
        }

        let boxed = ctor(data)?;
        let handle: InstanceHandle = Arc::new(Mutex::new(boxed));
        let instance_id = explicit_id.clone().unwrap_or_else(generate_isolated_id);

        let bound_fns = {
            let classes = self.classes.read();
            let mut map = HashMap::new();
            if let Some(class) = classes.get(class_name) {
                for (name, template) in &class.member_templates {
                    let template = template.clone();
                    let bound_handle = handle.clone();
                    let bound: BoundFn =
                        Arc::new(move |args: Value| template(bound_handle.clone(), args));
                    map.insert(name.clone(), bound);
                }
            }
            map
        };

        {
            let mut instances = self.instances.write();
            instances.insert(
                instance_id.clone(),
                InstanceRecord {
                    class_name: class_name.to_string(),
                    bound_fns,
                },
            );
        }
        if explicit_id.is_some() {
            self.named_instances
                .write()
                .insert(instance_id.clone(), class_name.to_string());
        }

        debug!(class = class_name, instance = %instance_id, named = explicit_id.is_some(), "created instance");
        Ok(Value::String(instance_id))
    }

    fn do_get_named(&self, id: &str) -> Result<Value, AgentError> {
        if self.instances.read().contains_key(id) {
            Ok(Value::String(id.to_string()))
        } else {
            Err(AgentError::TargetFailure(format!(
                "Instance with id: {id} does not exist"
            )))
        }
    }

    /// Deletes an instance. Returns `false` (not an error) when the id does
    /// not exist — unlike `__getNamed__`, a miss here is not exceptional.
    pub fn do_delete(&self, id: &str) -> bool {
        let removed = self.instances.write().remove(id);
        self.named_instances.write().remove(id);
        removed.is_some()
    }

    /// Registers an isolated instance's ownership so a later client-offline
    /// notification can reap it. No-op if the instance doesn't exist.
    pub fn track_isolated(&self, client_id: &str, instance_id: &str, class_name: &str) {
        self.isolated_owners
            .write()
            .entry(client_id.to_string())
            .or_default()
            .insert((instance_id.to_string(), class_name.to_string()));
    }

    pub fn untrack_isolated(&self, client_id: &str, instance_id: &str, class_name: &str) {
        let mut owners = self.isolated_owners.write();
        if let Some(set) = owners.get_mut(client_id) {
            set.remove(&(instance_id.to_string(), class_name.to_string()));
            if set.is_empty() {
                owners.remove(client_id);
            }
        }
    }

    /// True once a client owns zero isolated instances (or never owned
    /// any) — the signal to unsubscribe from its `__clientInfo__` topic.
    pub fn client_has_no_isolated(&self, client_id: &str) -> bool {
        !self.isolated_owners.read().contains_key(client_id)
    }

    /// Enumerates and clears one client's isolated instances, returning the
    /// `(instance_id, class_name)` pairs that were owned so the caller can
    /// unsubscribe their per-instance topics. Deletion itself reuses
    /// `do_delete`, exactly mirroring a user-triggered `__delete__`.
    pub fn reap_client(&self, client_id: &str) -> Vec<(String, String)> {
        let owned: Vec<(String, String)> = self
            .isolated_owners
            .write()
            .remove(client_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        for (instance_id, _class_name) in &owned {
            if !self.do_delete(instance_id) {
                warn!(instance = %instance_id, client = client_id, "orphan reap found instance already gone");
            }
        }
        owned
    }
}

fn invoke_caught<F>(f: F) -> Result<Value, AgentError>
where
    F: FnOnce() -> Result<Value, AgentError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "target panicked".to_string());
            Err(AgentError::TargetFailure(message))
        }
    }
}

fn generate_isolated_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn data_positional(data: &Value) -> Vec<Value> {
    let Some(obj) = data.as_object() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut i = 1usize;
    loop {
        let key = format!("_{i}");
        match obj.get(&key) {
            Some(v) => {
                out.push(v.clone());
                i += 1;
            }
            None => break,
        }
    }
    out
}

/// Rebuilds a `data` object with positional args shifted left by `skip`
/// slots (used to drop the explicit id `__createNamed__` consumes before
/// forwarding the remaining args to the constructor), preserving `s`.
fn reshift_positional(data: &Value, skip: usize) -> Value {
    let args = data_positional(data);
    let mut obj = serde_json::Map::new();
    for (i, arg) in args.into_iter().skip(skip).enumerate() {
        obj.insert(format!("_{}", i + 1), arg);
    }
    if let Some(s) = data.get("s") {
        obj.insert("s".to_string(), s.clone());
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(context: &str, method: &str, data: Value) -> RequestDoc {
        let mut data = data;
        if let Some(obj) = data.as_object_mut() {
            obj.entry("s").or_insert_with(|| Value::String("r".into()));
        }
        RequestDoc {
            context: context.to_string(),
            method: method.to_string(),
            data,
            s: "r".to_string(),
        }
    }

    fn register_calc(registry: &Registry) {
        registry.register_static_function(
            "Calc",
            "add-numbernumber",
            Arc::new(|data| {
                let args = data_positional(&data);
                let a = args[0].as_i64().unwrap();
                let b = args[1].as_i64().unwrap();
                Ok(Value::from(a + b))
            }),
        );
    }

    #[test]
    fn s1_static_add() {
        let registry = Registry::new();
        register_calc(&registry);
        let mut req = make_request("Calc", "add", serde_json::json!({"_1": 2, "_2": 3}));
        registry.call(&mut req);
        assert_eq!(req.data.get("r").unwrap(), 5);
        assert!(req.data.get("e").is_none());
    }

    fn register_foo(registry: &Registry) {
        #[derive(Default)]
        struct Foo {
            value: i64,
        }
        registry.register_constructor("Foo", "", Arc::new(|_data| Ok(Box::new(Foo::default()))));
        registry.register_member_function(
            "Foo",
            "setValue-number",
            Arc::new(|handle, data| {
                let args = data_positional(&data);
                let v = args[0].as_i64().unwrap();
                let mut guard = handle.lock();
                guard.downcast_mut::<Foo>().unwrap().value = v;
                Ok(Value::Null)
            }),
        );
        registry.register_member_function(
            "Foo",
            "getValue",
            Arc::new(|handle, _data| {
                let guard = handle.lock();
                Ok(Value::from(guard.downcast_ref::<Foo>().unwrap().value))
            }),
        );
    }

    #[test]
    fn s2_named_instance_round_trip() {
        let registry = Registry::new();
        register_foo(&registry);

        let mut create = make_request(
            "Foo",
            "__createNamed__",
            serde_json::json!({"_1": "foo-1"}),
        );
        registry.call(&mut create);
        assert_eq!(create.data.get("r").unwrap(), "foo-1");
        assert!(registry.get_instances("Foo").contains(&"foo-1".to_string()));

        let mut set = make_request("foo-1", "setValue", serde_json::json!({"_1": 42}));
        registry.call(&mut set);
        assert_eq!(set.data.get("r").unwrap(), &Value::Null);

        let mut get = make_request("foo-1", "getValue", serde_json::json!({}));
        registry.call(&mut get);
        assert_eq!(get.data.get("r").unwrap(), 42);
    }

    #[test]
    fn i7_idempotent_named_create() {
        let registry = Registry::new();
        register_foo(&registry);

        let mut first = make_request("Foo", "__createNamed__", serde_json::json!({"_1": "dup"}));
        registry.call(&mut first);
        let mut second = make_request("Foo", "__createNamed__", serde_json::json!({"_1": "dup"}));
        registry.call(&mut second);

        assert_eq!(first.data.get("r"), second.data.get("r"));
        assert_eq!(registry.get_instances("Foo").len(), 1);
    }

    #[test]
    fn i2_no_ghosts_after_delete() {
        let registry = Registry::new();
        register_foo(&registry);

        let mut create = make_request("Foo", "__createNamed__", serde_json::json!({"_1": "gone"}));
        registry.call(&mut create);

        let mut delete = make_request("Foo", "__delete__", serde_json::json!({"_1": "gone"}));
        registry.call(&mut delete);
        assert_eq!(delete.data.get("r").unwrap(), true);

        assert!(!registry.get_instances("Foo").contains(&"gone".to_string()));
        let mut after = make_request("gone", "setValue", serde_json::json!({"_1": 1}));
        registry.call(&mut after);
        assert_eq!(after.data.get("e").unwrap(), "Could not find context: gone");
    }

    #[test]
    fn r2_double_delete_is_idempotent_not_error() {
        let registry = Registry::new();
        register_foo(&registry);
        let mut create = make_request("Foo", "__createNamed__", serde_json::json!({"_1": "x"}));
        registry.call(&mut create);

        let mut d1 = make_request("Foo", "__delete__", serde_json::json!({"_1": "x"}));
        registry.call(&mut d1);
        assert_eq!(d1.data.get("r").unwrap(), true);

        let mut d2 = make_request("Foo", "__delete__", serde_json::json!({"_1": "x"}));
        registry.call(&mut d2);
        assert_eq!(d2.data.get("r").unwrap(), false);
        assert!(d2.data.get("e").is_none());
    }

    #[test]
    fn s5_arity_mismatch_is_function_not_found() {
        let registry = Registry::new();
        register_foo(&registry);
        let mut create = make_request("Foo", "__createNamed__", serde_json::json!({"_1": "y"}));
        registry.call(&mut create);

        let mut zero_arg = make_request("y", "setValue", serde_json::json!({}));
        registry.call(&mut zero_arg);
        let err = zero_arg.data.get("e").unwrap().as_str().unwrap();
        assert!(err.contains("Could not find function: setValue"));
    }

    #[test]
    fn unknown_class_is_context_not_found() {
        let registry = Registry::new();
        let mut req = make_request("Nope", "anything", serde_json::json!({}));
        registry.call(&mut req);
        assert_eq!(req.data.get("e").unwrap(), "Could not find context: Nope");
    }

    #[test]
    fn target_panic_becomes_target_failure() {
        let registry = Registry::new();
        registry.register_static_function("Boom", "go", Arc::new(|_data| panic!("kaboom")));
        let mut req = make_request("Boom", "go", serde_json::json!({}));
        registry.call(&mut req);
        assert_eq!(req.data.get("e").unwrap(), "kaboom");
    }

    #[test]
    fn i6_reap_deletes_every_owned_isolated_instance() {
        let registry = Registry::new();
        register_foo(&registry);

        let mut create = make_request("Foo", "__create__", serde_json::json!({}));
        registry.call(&mut create);
        let instance_id = create.data.get("r").unwrap().as_str().unwrap().to_string();
        registry.track_isolated("cli-A", &instance_id, "Foo");

        let reaped = registry.reap_client("cli-A");
        assert_eq!(reaped.len(), 1);
        assert!(registry.client_has_no_isolated("cli-A"));

        let mut after = make_request(&instance_id, "setValue", serde_json::json!({"_1": 1}));
        registry.call(&mut after);
        assert!(after
            .data
            .get("e")
            .unwrap()
            .as_str()
            .unwrap()
            .contains("Could not find context"));
    }

    #[test]
    fn static_base_names_include_lifecycle_ops_once_ctor_registered() {
        let registry = Registry::new();
        register_foo(&registry);
        let names = registry.static_base_names("Foo");
        for expected in ["__create__", "__createNamed__", "__getNamed__", "__delete__"] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
