use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use anyhow::{anyhow, bail};
use rustc_hash::FxHashMap;

use crate::desc::{JvmType, OBJECT_CLASS};
use crate::insn::Kind;
use crate::runtime::{RESULT_CLASS, ResultTag};

pub type ObjRef = Rc<RefCell<Object>>;

/// Operand-stack and local-variable value. Long and double occupy two slots
/// in the JVM; here they are single values that know they are wide.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Ref(ObjRef),
}

impl Value {
    pub fn object(obj: Object) -> Value {
        Value::Ref(Rc::new(RefCell::new(obj)))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::object(Object::Str(s.into()))
    }

    pub fn sentinel(outcome: Outcome) -> Value {
        Value::object(Object::Sentinel(ResultSentinel::new(outcome)))
    }

    /// Boxes a primitive into `class` (`java/lang/Integer`, ...).
    pub fn boxed(class: &str, value: Value) -> Value {
        Value::object(Object::Boxed {
            class: class.to_string(),
            value: Box::new(value),
        })
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn zero(kind: Kind) -> Value {
        match kind {
            Kind::Int => Value::Int(0),
            Kind::Long => Value::Long(0),
            Kind::Float => Value::Float(0.0),
            Kind::Double => Value::Double(0.0),
            Kind::Ref => Value::Null,
        }
    }

    pub fn default_of(ty: &JvmType) -> Value {
        ty.kind().map(Value::zero).unwrap_or(Value::Null)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Runtime class of a non-null reference.
    pub fn class_name(&self) -> Option<String> {
        match self {
            Value::Ref(obj) => Some(obj.borrow().class_name().to_string()),
            _ => None,
        }
    }

    /// Reference identity; two nulls are the same reference.
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Ref(a), Value::Ref(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The primitive inside a box, or the value itself.
    pub fn unboxed(&self) -> Value {
        if let Value::Ref(obj) = self
            && let Object::Boxed { value, .. } = &*obj.borrow()
        {
            return (**value).clone();
        }
        self.clone()
    }

    /// Parses a command-line argument as a value of `ty`.
    pub fn parse(ty: &JvmType, text: &str) -> anyhow::Result<Value> {
        let text = text.trim();
        Ok(match ty {
            JvmType::Boolean => match text {
                "true" | "1" => Value::Int(1),
                "false" | "0" => Value::Int(0),
                _ => bail!("'{}' is not a boolean", text),
            },
            JvmType::Char => Value::Int(text.chars().next().map(|c| c as i32).unwrap_or(0)),
            JvmType::Byte | JvmType::Short | JvmType::Int => Value::Int(text.parse()?),
            JvmType::Long => Value::Long(text.parse()?),
            JvmType::Float => Value::Float(text.parse()?),
            JvmType::Double => Value::Double(text.parse()?),
            JvmType::Object(name) if name == "java/lang/String" || name == OBJECT_CLASS => {
                if text == "null" {
                    Value::Null
                } else {
                    Value::string(text)
                }
            }
            other => return Err(anyhow!("cannot pass {} from the command line", other)),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            _ => self.same_ref(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Null => f.write_str("null"),
            Value::Ref(obj) => write!(f, "{}", obj.borrow()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue,
    Override(Value),
    Jump(u32),
}

/// Runtime form of `HookResult`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSentinel {
    pub outcome: Outcome,
    /// Target slot -> captured value.
    pub captures: BTreeMap<u16, Value>,
}

impl ResultSentinel {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            captures: BTreeMap::new(),
        }
    }

    pub fn tag(&self) -> ResultTag {
        match self.outcome {
            Outcome::Continue => ResultTag::Continue,
            Outcome::Override(_) => ResultTag::Override,
            Outcome::Jump(_) => ResultTag::Jump,
        }
    }
}

#[derive(Debug)]
pub enum Object {
    Str(String),
    Boxed { class: String, value: Box<Value> },
    Sentinel(ResultSentinel),
    Throwable { class: String, message: Option<String> },
    Instance { class: String, fields: FxHashMap<String, Value> },
}

impl Object {
    pub fn class_name(&self) -> &str {
        match self {
            Object::Str(_) => "java/lang/String",
            Object::Boxed { class, .. } | Object::Throwable { class, .. } | Object::Instance { class, .. } => class,
            Object::Sentinel(_) => RESULT_CLASS,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Str(s) => f.write_str(s),
            Object::Boxed { value, .. } => write!(f, "{}", value),
            Object::Sentinel(s) => write!(f, "HookResult({:?})", s.outcome),
            Object::Throwable { class, message } => match message {
                Some(msg) => write!(f, "{}: {}", class.replace('/', "."), msg),
                None => f.write_str(&class.replace('/', ".")),
            },
            Object::Instance { class, .. } => write!(f, "{}@instance", class.replace('/', ".")),
        }
    }
}

/// Abrupt completion of an invocation.
#[derive(Debug)]
pub enum Unwind {
    /// A Java-level exception that code may catch.
    Throw(Value),
    /// The executor itself gave up (malformed code, unknown method, ...).
    Fault(anyhow::Error),
}

impl Unwind {
    pub fn throw(class: &str, message: impl Into<String>) -> Unwind {
        Unwind::Throw(Value::object(Object::Throwable {
            class: class.to_string(),
            message: Some(message.into()),
        }))
    }

    pub fn fault(msg: impl fmt::Display) -> Unwind {
        Unwind::Fault(anyhow!("{}", msg))
    }

    /// Class of the thrown exception, if this is a throw.
    pub fn exception_class(&self) -> Option<String> {
        match self {
            Unwind::Throw(value) => value.class_name(),
            Unwind::Fault(_) => None,
        }
    }

    pub fn message(&self) -> Option<String> {
        match self {
            Unwind::Throw(Value::Ref(obj)) => match &*obj.borrow() {
                Object::Throwable { message, .. } => message.clone(),
                _ => None,
            },
            Unwind::Throw(_) => None,
            Unwind::Fault(err) => Some(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for Unwind {
    fn from(err: anyhow::Error) -> Self {
        Unwind::Fault(err)
    }
}

impl fmt::Display for Unwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unwind::Throw(value) => write!(f, "uncaught exception {}", value),
            Unwind::Fault(err) => write!(f, "execution fault: {}", err),
        }
    }
}

impl std::error::Error for Unwind {}
