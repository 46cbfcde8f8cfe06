//! Reference executor for the instruction model.
//!
//! Runs woven code the way a JVM would for the subset the engine emits:
//! int/long/float/double arithmetic, branches, switches, static and virtual
//! calls, fields, casts, exceptions with handler tables, and the runtime half
//! of the hook protocol (sentinel, reentry guard, lazily bound call sites,
//! native binding).

mod natives;
mod value;

use std::rc::Rc;
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHashMap;

use crate::class::{ClassNode, MethodNode};
use crate::desc::{JvmType, MethodDescriptor, OBJECT_CLASS};
use crate::insn::{ArithOp, Constant, FieldOp, Insn, InvokeKind, JumpOp, Kind, LabelId, MemberRef, TypeOp};
use crate::runtime::{BOOTSTRAP_CLASS, BOOTSTRAP_METHOD, native_symbol_name};

pub use natives::{
    ARITHMETIC, CLASS_CAST, NULL_POINTER, STACK_OVERFLOW, THROWABLE, UNSATISFIED_LINK, guard_active, guard_enter,
    guard_exit,
};
pub use value::{ObjRef, Object, Outcome, ResultSentinel, Unwind, Value};

/// Host implementation of a method: native symbols and Rust-side handlers.
pub type NativeFn = Arc<dyn Fn(&mut Interpreter, &[Value]) -> Result<Option<Value>, Unwind> + Send + Sync>;

/// Call-site table shared by every interpreter built from the same linker.
/// Each call site identity is bound once.
#[derive(Clone, Default)]
pub struct Linker {
    sites: Arc<DashMap<String, MemberRef>>,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, identity: &str) -> bool {
        self.sites.contains_key(identity)
    }

    pub fn bound(&self) -> usize {
        self.sites.len()
    }

    fn bind(&self, identity: &str, resolve: impl FnOnce() -> Result<MemberRef, Unwind>) -> Result<MemberRef, Unwind> {
        if let Some(hit) = self.sites.get(identity) {
            return Ok(hit.value().clone());
        }
        let target = resolve()?;
        tracing::debug!(target: "hookweave::exec", site = identity, "call site bound");
        Ok(self.sites.entry(identity.to_string()).or_insert(target).value().clone())
    }
}

#[derive(Debug, Clone, Copy)]
struct Handler {
    start: usize,
    end: usize,
    target: usize,
}

#[derive(Debug)]
struct HandlerRange {
    range: Handler,
    catch_type: Option<String>,
}

/// A method body flattened for execution.
#[derive(Debug)]
struct Prepared {
    label: String,
    code: Vec<Insn>,
    labels: FxHashMap<LabelId, usize>,
    handlers: Vec<HandlerRange>,
    desc: MethodDescriptor,
    is_static: bool,
    max_locals: usize,
}

impl Prepared {
    fn new(owner: &str, method: &MethodNode) -> Result<Prepared, Unwind> {
        let desc = method.descriptor().map_err(Unwind::fault)?;
        let code = method.code.to_vec();
        let labels: FxHashMap<LabelId, usize> = code
            .iter()
            .enumerate()
            .filter_map(|(idx, insn)| match insn {
                Insn::Label(id) => Some((*id, idx)),
                _ => None,
            })
            .collect();
        let pos = |id: LabelId| {
            labels
                .get(&id)
                .copied()
                .ok_or_else(|| Unwind::fault(format!("{}.{}: unknown label {:?}", owner, method.name, id)))
        };
        let mut handlers = Vec::with_capacity(method.try_catch.len());
        for block in &method.try_catch {
            handlers.push(HandlerRange {
                range: Handler {
                    start: pos(block.start)?,
                    end: pos(block.end)?,
                    target: pos(block.handler)?,
                },
                catch_type: block.catch_type.clone(),
            });
        }
        let receiver = usize::from(!method.is_static());
        let max_locals = usize::from(method.max_locals).max(usize::from(desc.arg_slots()) + receiver);
        Ok(Prepared {
            label: format!("{}.{}{}", owner, method.name, method.desc),
            code,
            labels,
            handlers,
            desc,
            is_static: method.is_static(),
            max_locals,
        })
    }

    fn target(&self, label: LabelId) -> Result<usize, Unwind> {
        self.labels
            .get(&label)
            .copied()
            .ok_or_else(|| Unwind::fault(format!("{}: jump to unknown label {:?}", self.label, label)))
    }
}

enum Resolved {
    Code(Rc<Prepared>),
    Native(NativeFn),
}

enum Flow {
    Next,
    Jump(usize),
    Return(Option<Value>),
}

const DEFAULT_MAX_DEPTH: usize = 256;

/// Single-threaded executor over a set of loaded classes.
pub struct Interpreter {
    classes: FxHashMap<String, ClassNode>,
    natives: FxHashMap<(String, String, String), NativeFn>,
    statics: FxHashMap<(String, String), Value>,
    prepared: FxHashMap<(String, String, String), Rc<Prepared>>,
    linker: Linker,
    depth: usize,
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_linker(Linker::new())
    }

    pub fn with_linker(linker: Linker) -> Self {
        Self {
            classes: FxHashMap::default(),
            natives: FxHashMap::default(),
            statics: FxHashMap::default(),
            prepared: FxHashMap::default(),
            linker,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn linker(&self) -> &Linker {
        &self.linker
    }

    pub fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth;
    }

    /// Loads (or replaces) a class.
    pub fn load(&mut self, class: ClassNode) {
        let name = class.name.clone();
        self.prepared.retain(|(owner, _, _), _| *owner != name);
        self.classes.insert(name, class);
    }

    pub fn class(&self, name: &str) -> Option<&ClassNode> {
        self.classes.get(name)
    }

    /// Binds a host implementation to `class.name(desc)`. Used for native
    /// methods (looked up by their exported symbol) and for methods of classes
    /// that are not loaded at all.
    pub fn register_native<F>(&mut self, class: &str, name: &str, desc: &str, f: F)
    where
        F: Fn(&mut Interpreter, &[Value]) -> Result<Option<Value>, Unwind> + Send + Sync + 'static,
    {
        self.natives
            .insert((class.to_string(), name.to_string(), desc.to_string()), Arc::new(f));
    }

    /// Allocates an instance of a loaded class without running a constructor.
    pub fn new_instance(&self, class: &str) -> Value {
        Value::object(Object::Instance {
            class: class.to_string(),
            fields: FxHashMap::default(),
        })
    }

    pub fn static_field(&self, class: &str, name: &str) -> Option<&Value> {
        self.statics.get(&(class.to_string(), name.to_string()))
    }

    /// Invokes `class.name(desc)`. For instance methods the receiver is the
    /// first element of `args`.
    pub fn invoke(&mut self, class: &str, name: &str, desc: &str, args: Vec<Value>) -> Result<Option<Value>, Unwind> {
        let is_static = self
            .classes
            .get(class)
            .and_then(|c| c.method(name, desc))
            .is_none_or(MethodNode::is_static);
        let kind = if is_static { InvokeKind::Static } else { InvokeKind::Virtual };
        self.call(kind, &MemberRef::new(class, name, desc), args)
    }

    /// Whether `class` is `target` or one of its subclasses.
    pub fn is_subclass(&self, class: &str, target: &str) -> bool {
        if target == OBJECT_CLASS {
            return true;
        }
        let mut current = Some(class.to_string());
        let mut hops = 0;
        while let Some(name) = current {
            if name == target {
                return true;
            }
            hops += 1;
            if hops > 64 {
                return false;
            }
            current = self.super_of(&name);
        }
        false
    }

    fn super_of(&self, class: &str) -> Option<String> {
        match self.classes.get(class) {
            Some(node) => node.super_name.clone(),
            None => natives::BUILTIN_SUPERS.get(class).map(|s| s.to_string()),
        }
    }

    fn instance_of(&self, value: &Value, target: &str) -> bool {
        match value.class_name() {
            Some(class) => self.is_subclass(&class, target),
            None => false,
        }
    }

    fn throw_new(&self, class: &str, message: impl Into<String>) -> Unwind {
        Unwind::throw(class, message)
    }

    fn resolve(&mut self, start: &str, name: &str, desc: &str) -> Result<Resolved, Unwind> {
        let mut current = Some(start.to_string());
        while let Some(class) = current {
            if let Some(node) = self.classes.get(&class) {
                if let Some(method) = node.method(name, desc) {
                    if method.is_native() {
                        let symbol = native_symbol_name(name);
                        let key = (class.clone(), symbol.to_string(), desc.to_string());
                        return match self.natives.get(&key) {
                            Some(f) => Ok(Resolved::Native(f.clone())),
                            None => Err(self.throw_new(UNSATISFIED_LINK, format!("{}.{}{}", class, symbol, desc))),
                        };
                    }
                    if !method.is_abstract() {
                        let key = (class.clone(), name.to_string(), desc.to_string());
                        if let Some(prepared) = self.prepared.get(&key) {
                            return Ok(Resolved::Code(prepared.clone()));
                        }
                        let prepared = Rc::new(Prepared::new(&class, method)?);
                        self.prepared.insert(key, prepared.clone());
                        return Ok(Resolved::Code(prepared));
                    }
                }
            } else if let Some(f) = self.natives.get(&(class.clone(), name.to_string(), desc.to_string())) {
                return Ok(Resolved::Native(f.clone()));
            }
            current = self.super_of(&class);
        }
        Err(Unwind::fault(format!("no method {}.{}{}", start, name, desc)))
    }

    fn call(&mut self, kind: InvokeKind, method: &MemberRef, args: Vec<Value>) -> Result<Option<Value>, Unwind> {
        let throwable = self.is_subclass(&method.owner, THROWABLE);
        if let Some(result) = natives::intrinsic(kind, method, &args, throwable) {
            return result;
        }
        let start = match kind {
            InvokeKind::Static | InvokeKind::Special => method.owner.clone(),
            InvokeKind::Virtual | InvokeKind::Interface => match args.first() {
                Some(Value::Null) | None => {
                    return Err(self.throw_new(NULL_POINTER, format!("invoking {} on null", method.name)));
                }
                Some(receiver) => receiver.class_name().unwrap_or_else(|| method.owner.clone()),
            },
        };
        match self.resolve(&start, &method.name, &method.desc)? {
            Resolved::Native(f) => f(self, &args),
            Resolved::Code(prepared) => self.run(&prepared, args),
        }
    }

    fn run(&mut self, method: &Prepared, args: Vec<Value>) -> Result<Option<Value>, Unwind> {
        if self.depth >= self.max_depth {
            return Err(self.throw_new(STACK_OVERFLOW, method.label.clone()));
        }
        self.depth += 1;
        let result = self.execute(method, args);
        self.depth -= 1;
        result
    }

    fn execute(&mut self, method: &Prepared, args: Vec<Value>) -> Result<Option<Value>, Unwind> {
        let mut locals = vec![Value::Null; method.max_locals];
        let mut slot = 0usize;
        let mut params = args.into_iter();
        if !method.is_static {
            locals[0] = params.next().unwrap_or(Value::Null);
            slot = 1;
        }
        for ty in &method.desc.params {
            let value = params.next().unwrap_or_else(|| Value::default_of(ty));
            set_local(&mut locals, slot, value);
            slot += usize::from(ty.width());
        }

        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;
        loop {
            let Some(insn) = method.code.get(pc) else {
                return Err(Unwind::fault(format!("{}: fell off the end of the code", method.label)));
            };
            match self.step(method, insn, &mut stack, &mut locals) {
                Ok(Flow::Next) => pc += 1,
                Ok(Flow::Jump(target)) => pc = target,
                Ok(Flow::Return(value)) => return Ok(value),
                Err(Unwind::Throw(exception)) => match self.find_handler(method, pc, &exception) {
                    Some(target) => {
                        stack.clear();
                        stack.push(exception);
                        pc = target;
                    }
                    None => return Err(Unwind::Throw(exception)),
                },
                Err(fault) => return Err(fault),
            }
        }
    }

    fn find_handler(&self, method: &Prepared, pc: usize, exception: &Value) -> Option<usize> {
        method
            .handlers
            .iter()
            .find(|h| {
                h.range.start <= pc
                    && pc < h.range.end
                    && h.catch_type.as_deref().is_none_or(|class| self.instance_of(exception, class))
            })
            .map(|h| h.range.target)
    }

    fn step(&mut self, method: &Prepared, insn: &Insn, stack: &mut Vec<Value>, locals: &mut Vec<Value>) -> Result<Flow, Unwind> {
        match insn {
            Insn::Label(_) | Insn::Nop => {}
            Insn::Const(c) => stack.push(match c {
                Constant::Null => Value::Null,
                Constant::Int(v) => Value::Int(*v),
                Constant::Long(v) => Value::Long(*v),
                Constant::Float(v) => Value::Float(*v),
                Constant::Double(v) => Value::Double(*v),
                Constant::Str(s) | Constant::Class(s) => Value::string(s.clone()),
            }),
            Insn::Load(_, slot) => {
                let value = locals.get(usize::from(*slot)).cloned().unwrap_or(Value::Null);
                stack.push(value);
            }
            Insn::Store(_, slot) => {
                let value = pop(stack)?;
                set_local(locals, usize::from(*slot), value);
            }
            Insn::Pop => {
                pop(stack)?;
            }
            Insn::Pop2 => {
                if !pop(stack)?.is_wide() {
                    pop(stack)?;
                }
            }
            Insn::Dup => {
                let top = stack.last().cloned().ok_or_else(underflow)?;
                stack.push(top);
            }
            Insn::DupX1 => {
                let v1 = pop(stack)?;
                let v2 = pop(stack)?;
                stack.extend([v1.clone(), v2, v1]);
            }
            Insn::DupX2 => {
                let v1 = pop(stack)?;
                let v2 = pop(stack)?;
                if v2.is_wide() {
                    stack.extend([v1.clone(), v2, v1]);
                } else {
                    let v3 = pop(stack)?;
                    stack.extend([v1.clone(), v3, v2, v1]);
                }
            }
            Insn::Dup2 => {
                let v1 = pop(stack)?;
                if v1.is_wide() {
                    stack.extend([v1.clone(), v1]);
                } else {
                    let v2 = pop(stack)?;
                    stack.extend([v2.clone(), v1.clone(), v2, v1]);
                }
            }
            Insn::Swap => {
                let v1 = pop(stack)?;
                let v2 = pop(stack)?;
                stack.extend([v1, v2]);
            }
            Insn::Arith(op, kind) => {
                let result = if *op == ArithOp::Neg {
                    negate(pop(stack)?)?
                } else {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    arith(*op, *kind, a, b)?
                };
                stack.push(result);
            }
            Insn::Jump(op, label) => {
                let taken = match op {
                    JumpOp::Goto => true,
                    JumpOp::If(cond) => cond.test(pop_int(stack)?.cmp(&0)),
                    JumpOp::IfICmp(cond) => {
                        let b = pop_int(stack)?;
                        let a = pop_int(stack)?;
                        cond.test(a.cmp(&b))
                    }
                    JumpOp::IfACmpEq | JumpOp::IfACmpNe => {
                        let b = pop(stack)?;
                        let a = pop(stack)?;
                        a.same_ref(&b) == (*op == JumpOp::IfACmpEq)
                    }
                    JumpOp::IfNull => pop(stack)?.is_null(),
                    JumpOp::IfNonNull => !pop(stack)?.is_null(),
                };
                if taken {
                    return Ok(Flow::Jump(method.target(*label)?));
                }
            }
            Insn::TableSwitch { low, default, targets } => {
                let index = i64::from(pop_int(stack)?) - i64::from(*low);
                let label = usize::try_from(index)
                    .ok()
                    .and_then(|i| targets.get(i))
                    .unwrap_or(default);
                return Ok(Flow::Jump(method.target(*label)?));
            }
            Insn::Invoke { kind, method: callee } => {
                let desc = callee.method_desc().ok_or_else(|| Unwind::fault(format!("bad descriptor {}", callee.desc)))?;
                let receiver = usize::from(*kind != InvokeKind::Static);
                let args = pop_n(stack, desc.params.len() + receiver)?;
                if let Some(value) = self.call(*kind, callee, args)? {
                    stack.push(value);
                }
            }
            Insn::InvokeDynamic {
                name,
                desc,
                bootstrap,
                args: bsm_args,
            } => {
                let target = self.link(name, desc, bootstrap, bsm_args)?;
                let parsed = MethodDescriptor::parse(desc).map_err(Unwind::fault)?;
                let args = pop_n(stack, parsed.params.len())?;
                if let Some(value) = self.call(InvokeKind::Static, &target, args)? {
                    stack.push(value);
                }
            }
            Insn::Field { op, field } => self.field(*op, field, stack)?,
            Insn::Type(op, class) => match op {
                TypeOp::New => {
                    let obj = if self.is_subclass(class, THROWABLE) {
                        Object::Throwable {
                            class: class.clone(),
                            message: None,
                        }
                    } else {
                        Object::Instance {
                            class: class.clone(),
                            fields: FxHashMap::default(),
                        }
                    };
                    stack.push(Value::object(obj));
                }
                TypeOp::CheckCast => {
                    let top = stack.last().ok_or_else(underflow)?;
                    if !top.is_null() && !self.instance_of(top, class) {
                        let actual = top.class_name().unwrap_or_else(|| "primitive".into());
                        return Err(self.throw_new(
                            CLASS_CAST,
                            format!("{} cannot be cast to {}", actual.replace('/', "."), class.replace('/', ".")),
                        ));
                    }
                }
                TypeOp::InstanceOf => {
                    let value = pop(stack)?;
                    stack.push(Value::Int(i32::from(self.instance_of(&value, class))));
                }
            },
            Insn::Return(kind) => {
                return Ok(Flow::Return(match kind {
                    Some(_) => Some(pop(stack)?),
                    None => None,
                }));
            }
            Insn::Throw => {
                let exception = pop(stack)?;
                if exception.is_null() {
                    return Err(self.throw_new(NULL_POINTER, "throw null"));
                }
                return Err(Unwind::Throw(exception));
            }
        }
        Ok(Flow::Next)
    }

    fn link(&self, name: &str, desc: &str, bootstrap: &MemberRef, args: &[Constant]) -> Result<MemberRef, Unwind> {
        if bootstrap.owner != BOOTSTRAP_CLASS || bootstrap.name != BOOTSTRAP_METHOD.0 {
            return Err(Unwind::fault(format!("unsupported bootstrap {}.{}", bootstrap.owner, bootstrap.name)));
        }
        let [Constant::Str(owner), Constant::Str(method), Constant::Str(method_desc)] = args else {
            return Err(Unwind::fault("handler call site expects owner, name and descriptor"));
        };
        if method != name || method_desc != desc {
            return Err(Unwind::fault(format!("call site {}{} does not match its handler {}{}", name, desc, method, method_desc)));
        }
        let identity = format!("{}.{}{}", owner, method, method_desc);
        self.linker.bind(&identity, || {
            let known = self.classes.get(owner.as_str()).is_some_and(|c| c.method(method, method_desc).is_some())
                || self.natives.contains_key(&(owner.clone(), method.clone(), method_desc.clone()));
            if known {
                Ok(MemberRef::new(owner.clone(), method.clone(), method_desc.clone()))
            } else {
                Err(Unwind::fault(format!("cannot bind handler {}", identity)))
            }
        })
    }

    fn field(&mut self, op: FieldOp, field: &MemberRef, stack: &mut Vec<Value>) -> Result<(), Unwind> {
        let ty = field.field_type().unwrap_or(JvmType::object(OBJECT_CLASS));
        let key = (field.owner.clone(), field.name.clone());
        match op {
            FieldOp::GetStatic => {
                let value = self.statics.get(&key).cloned().unwrap_or_else(|| Value::default_of(&ty));
                stack.push(value);
            }
            FieldOp::PutStatic => {
                let value = pop(stack)?;
                self.statics.insert(key, value);
            }
            FieldOp::GetField => {
                let obj = pop(stack)?;
                let value = match &obj {
                    Value::Ref(obj) => match &*obj.borrow() {
                        Object::Instance { fields, .. } => fields.get(&field.name).cloned(),
                        _ => None,
                    },
                    _ => return Err(self.throw_new(NULL_POINTER, format!("reading field {} of null", field.name))),
                };
                stack.push(value.unwrap_or_else(|| Value::default_of(&ty)));
            }
            FieldOp::PutField => {
                let value = pop(stack)?;
                let obj = pop(stack)?;
                match &obj {
                    Value::Ref(obj) => {
                        if let Object::Instance { fields, .. } = &mut *obj.borrow_mut() {
                            fields.insert(field.name.clone(), value);
                        }
                    }
                    _ => return Err(self.throw_new(NULL_POINTER, format!("writing field {} of null", field.name))),
                }
            }
        }
        Ok(())
    }
}

fn underflow() -> Unwind {
    Unwind::fault("operand stack underflow")
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, Unwind> {
    stack.pop().ok_or_else(underflow)
}

fn pop_int(stack: &mut Vec<Value>) -> Result<i32, Unwind> {
    match pop(stack)? {
        Value::Int(v) => Ok(v),
        other => Err(Unwind::fault(format!("expected int on the stack, found {:?}", other))),
    }
}

/// Pops `n` values, returned in push order.
fn pop_n(stack: &mut Vec<Value>, n: usize) -> Result<Vec<Value>, Unwind> {
    if stack.len() < n {
        return Err(underflow());
    }
    Ok(stack.split_off(stack.len() - n))
}

fn set_local(locals: &mut Vec<Value>, slot: usize, value: Value) {
    let needed = slot + if value.is_wide() { 2 } else { 1 };
    if locals.len() < needed {
        locals.resize(needed, Value::Null);
    }
    if value.is_wide() {
        locals[slot + 1] = Value::Null;
    }
    locals[slot] = value;
}

fn negate(value: Value) -> Result<Value, Unwind> {
    Ok(match value {
        Value::Int(v) => Value::Int(v.wrapping_neg()),
        Value::Long(v) => Value::Long(v.wrapping_neg()),
        Value::Float(v) => Value::Float(-v),
        Value::Double(v) => Value::Double(-v),
        other => return Err(Unwind::fault(format!("cannot negate {:?}", other))),
    })
}

fn arith(op: ArithOp, kind: Kind, a: Value, b: Value) -> Result<Value, Unwind> {
    let divide_by_zero = || Unwind::throw(ARITHMETIC, "/ by zero");
    Ok(match (a, b) {
        (Value::Int(a), Value::Int(b)) => Value::Int(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div if b == 0 => return Err(divide_by_zero()),
            ArithOp::Div => a.wrapping_div(b),
            ArithOp::Rem if b == 0 => return Err(divide_by_zero()),
            ArithOp::Rem => a.wrapping_rem(b),
            ArithOp::And => a & b,
            ArithOp::Or => a | b,
            ArithOp::Xor => a ^ b,
            ArithOp::Neg => a.wrapping_neg(),
        }),
        (Value::Long(a), Value::Long(b)) => Value::Long(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div if b == 0 => return Err(divide_by_zero()),
            ArithOp::Div => a.wrapping_div(b),
            ArithOp::Rem if b == 0 => return Err(divide_by_zero()),
            ArithOp::Rem => a.wrapping_rem(b),
            ArithOp::And => a & b,
            ArithOp::Or => a | b,
            ArithOp::Xor => a ^ b,
            ArithOp::Neg => a.wrapping_neg(),
        }),
        (Value::Float(a), Value::Float(b)) => Value::Float(match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Rem => a % b,
            _ => return Err(Unwind::fault(format!("{:?} is not defined on {:?}", op, kind))),
        }),
        (Value::Double(a), Value::Double(b)) => Value::Double(match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Rem => a % b,
            _ => return Err(Unwind::fault(format!("{:?} is not defined on {:?}", op, kind))),
        }),
        (a, b) => return Err(Unwind::fault(format!("{:?} on mismatched operands {:?} and {:?}", op, a, b))),
    })
}

#[cfg(test)]
mod exec_test;
