//! JVM field and method descriptors.
//!
//! Descriptors are kept in their textual form on the wire (`I`, `Ljava/lang/String;`,
//! `(IJ)V`) and parsed into [`JvmType`] / [`MethodDescriptor`] whenever the weaver
//! needs slot widths, computational kinds or box conversions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::insn::Kind;

pub const OBJECT_CLASS: &str = "java/lang/Object";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum JvmType {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object(String),
    Array(Box<JvmType>),
}

impl JvmType {
    pub fn object(name: impl Into<String>) -> Self {
        JvmType::Object(name.into())
    }

    pub fn parse(desc: &str) -> Result<JvmType, DescriptorError> {
        let mut chars = DescCursor::new(desc);
        let ty = chars.parse_type()?;
        if !chars.at_end() {
            return Err(DescriptorError::new(desc, "trailing characters after type"));
        }
        Ok(ty)
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            JvmType::Void => out.push('V'),
            JvmType::Boolean => out.push('Z'),
            JvmType::Byte => out.push('B'),
            JvmType::Char => out.push('C'),
            JvmType::Short => out.push('S'),
            JvmType::Int => out.push('I'),
            JvmType::Long => out.push('J'),
            JvmType::Float => out.push('F'),
            JvmType::Double => out.push('D'),
            JvmType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            JvmType::Array(elem) => {
                out.push('[');
                elem.write_descriptor(out);
            }
        }
    }

    /// Name usable as the operand of `checkcast`/`new`: the internal name for
    /// classes, the full descriptor for arrays.
    pub fn internal_name(&self) -> Option<String> {
        match self {
            JvmType::Object(name) => Some(name.clone()),
            JvmType::Array(_) => Some(self.descriptor()),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, JvmType::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Object(_) | JvmType::Array(_))
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_reference() && !self.is_void()
    }

    pub fn is_object_root(&self) -> bool {
        matches!(self, JvmType::Object(name) if name == OBJECT_CLASS)
    }

    /// Computational kind used by load/store/return instructions.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            JvmType::Void => None,
            JvmType::Boolean | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Int => Some(Kind::Int),
            JvmType::Long => Some(Kind::Long),
            JvmType::Float => Some(Kind::Float),
            JvmType::Double => Some(Kind::Double),
            JvmType::Object(_) | JvmType::Array(_) => Some(Kind::Ref),
        }
    }

    /// Local-variable / operand-stack slot width.
    pub fn width(&self) -> u16 {
        match self {
            JvmType::Void => 0,
            JvmType::Long | JvmType::Double => 2,
            _ => 1,
        }
    }

    /// Wrapper class for primitive types.
    pub fn box_class(&self) -> Option<&'static str> {
        Some(match self {
            JvmType::Boolean => "java/lang/Boolean",
            JvmType::Byte => "java/lang/Byte",
            JvmType::Char => "java/lang/Character",
            JvmType::Short => "java/lang/Short",
            JvmType::Int => "java/lang/Integer",
            JvmType::Long => "java/lang/Long",
            JvmType::Float => "java/lang/Float",
            JvmType::Double => "java/lang/Double",
            _ => return None,
        })
    }

    /// Name of the wrapper accessor that yields this primitive (`intValue`, ...).
    pub fn unbox_method(&self) -> Option<&'static str> {
        Some(match self {
            JvmType::Boolean => "booleanValue",
            JvmType::Byte => "byteValue",
            JvmType::Char => "charValue",
            JvmType::Short => "shortValue",
            JvmType::Int => "intValue",
            JvmType::Long => "longValue",
            JvmType::Float => "floatValue",
            JvmType::Double => "doubleValue",
            _ => return None,
        })
    }

    /// Inverse of [`JvmType::box_class`].
    pub fn unboxed(class: &str) -> Option<JvmType> {
        Some(match class {
            "java/lang/Boolean" => JvmType::Boolean,
            "java/lang/Byte" => JvmType::Byte,
            "java/lang/Character" => JvmType::Char,
            "java/lang/Short" => JvmType::Short,
            "java/lang/Integer" => JvmType::Int,
            "java/lang/Long" => JvmType::Long,
            "java/lang/Float" => JvmType::Float,
            "java/lang/Double" => JvmType::Double,
            _ => return None,
        })
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl TryFrom<String> for JvmType {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        JvmType::parse(&value)
    }
}

impl From<JvmType> for String {
    fn from(value: JvmType) -> Self {
        value.descriptor()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MethodDescriptor {
    pub params: Vec<JvmType>,
    pub ret: JvmType,
}

impl MethodDescriptor {
    pub fn new(params: Vec<JvmType>, ret: JvmType) -> Self {
        Self { params, ret }
    }

    pub fn parse(desc: &str) -> Result<MethodDescriptor, DescriptorError> {
        let mut chars = DescCursor::new(desc);
        if !chars.eat('(') {
            return Err(DescriptorError::new(desc, "method descriptor must start with '('"));
        }
        let mut params = Vec::new();
        while !chars.eat(')') {
            if chars.at_end() {
                return Err(DescriptorError::new(desc, "unterminated parameter list"));
            }
            let ty = chars.parse_type()?;
            if ty.is_void() {
                return Err(DescriptorError::new(desc, "void parameter"));
            }
            params.push(ty);
        }
        let ret = chars.parse_type()?;
        if !chars.at_end() {
            return Err(DescriptorError::new(desc, "trailing characters after return type"));
        }
        Ok(MethodDescriptor { params, ret })
    }

    /// Slots taken by the arguments (receiver excluded).
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(JvmType::width).sum()
    }

    /// Local slot of every parameter, given where the first one starts.
    pub fn param_slots(&self, first: u16) -> Vec<u16> {
        let mut slot = first;
        self.params
            .iter()
            .map(|ty| {
                let current = slot;
                slot += ty.width();
                current
            })
            .collect()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            f.write_str(&param.descriptor())?;
        }
        write!(f, "){}", self.ret.descriptor())
    }
}

impl TryFrom<String> for MethodDescriptor {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MethodDescriptor::parse(&value)
    }
}

impl From<MethodDescriptor> for String {
    fn from(value: MethodDescriptor) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorError {
    desc: String,
    msg: &'static str,
}

impl DescriptorError {
    fn new(desc: &str, msg: &'static str) -> Self {
        Self {
            desc: desc.to_string(),
            msg,
        }
    }
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid descriptor '{}': {}", self.desc, self.msg)
    }
}

impl std::error::Error for DescriptorError {}

struct DescCursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> DescCursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn parse_type(&mut self) -> Result<JvmType, DescriptorError> {
        let Some(c) = self.peek() else {
            return Err(DescriptorError::new(self.src, "unexpected end of descriptor"));
        };
        self.pos += c.len_utf8();
        let ty = match c {
            'V' => JvmType::Void,
            'Z' => JvmType::Boolean,
            'B' => JvmType::Byte,
            'C' => JvmType::Char,
            'S' => JvmType::Short,
            'I' => JvmType::Int,
            'J' => JvmType::Long,
            'F' => JvmType::Float,
            'D' => JvmType::Double,
            'L' => {
                let rest = &self.src[self.pos..];
                let end = rest
                    .find(';')
                    .ok_or_else(|| DescriptorError::new(self.src, "unterminated class type"))?;
                if end == 0 {
                    return Err(DescriptorError::new(self.src, "empty class name"));
                }
                let name = rest[..end].to_string();
                self.pos += end + 1;
                JvmType::Object(name)
            }
            '[' => {
                let elem = self.parse_type()?;
                if elem.is_void() {
                    return Err(DescriptorError::new(self.src, "array of void"));
                }
                JvmType::Array(Box::new(elem))
            }
            _ => return Err(DescriptorError::new(self.src, "unknown type tag")),
        };
        Ok(ty)
    }
}

/// Accepts both `pkg.Type` and `pkg/Type`.
pub fn internal_class_name(name: &str) -> String {
    name.trim().replace('.', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_descriptor_with_wide_and_reference_params() {
        let desc = MethodDescriptor::parse("(IJLjava/lang/String;[D)Z").expect("descriptor");
        assert_eq!(
            desc.params,
            vec![
                JvmType::Int,
                JvmType::Long,
                JvmType::object("java/lang/String"),
                JvmType::Array(Box::new(JvmType::Double)),
            ]
        );
        assert_eq!(desc.ret, JvmType::Boolean);
        assert_eq!(desc.arg_slots(), 5);
        assert_eq!(desc.param_slots(1), vec![1, 2, 4, 5]);
        assert_eq!(desc.to_string(), "(IJLjava/lang/String;[D)Z");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(V)V").is_err());
        assert!(MethodDescriptor::parse("(Ljava/lang/String)V").is_err());
        assert!(JvmType::parse("IX").is_err());
        assert!(JvmType::parse("L;").is_err());
    }

    #[test]
    fn box_metadata_matches_primitives() {
        assert_eq!(JvmType::Int.box_class(), Some("java/lang/Integer"));
        assert_eq!(JvmType::Boolean.unbox_method(), Some("booleanValue"));
        assert_eq!(JvmType::unboxed("java/lang/Long"), Some(JvmType::Long));
        assert_eq!(JvmType::object("java/lang/Long").box_class(), None);
        assert_eq!(internal_class_name("demo.Calc"), "demo/Calc");
    }
}
