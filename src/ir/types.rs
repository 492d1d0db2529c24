//! IR type system

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Void type
    Void,

    /// Integer type with bit width (e.g., i1, i8, i32, i64)
    Int(u32),

    /// Pointer type (opaque)
    Ptr,

    /// Array type [N x T]
    Array(u64, Box<Type>),

    /// Struct type { T1, T2, ... }, optionally packed
    Struct { fields: Vec<Type>, packed: bool },

    /// Fixed-width vector type <N x T>
    Vector(u32, Box<Type>),

    /// Function type
    Function {
        ret: Box<Type>,
        params: Vec<Type>,
        varargs: bool,
    },
}

impl Type {
    pub fn i1() -> Self {
        Type::Int(1)
    }

    pub fn i8() -> Self {
        Type::Int(8)
    }

    pub fn i32() -> Self {
        Type::Int(32)
    }

    pub fn i64() -> Self {
        Type::Int(64)
    }

    pub fn array(len: u64, elem: Type) -> Self {
        Type::Array(len, Box::new(elem))
    }

    pub fn vector(len: u32, elem: Type) -> Self {
        Type::Vector(len, Box::new(elem))
    }

    pub fn struct_of(fields: Vec<Type>) -> Self {
        Type::Struct { fields, packed: false }
    }

    pub fn packed_struct_of(fields: Vec<Type>) -> Self {
        Type::Struct { fields, packed: true }
    }

    /// Get the bit width of this type (for integer types)
    pub fn bit_width(&self) -> u32 {
        match self {
            Type::Int(bits) => *bits,
            _ => 0,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector(_, _))
    }

    /// `<N x ptr>`, the result type of a vector GEP
    pub fn is_ptr_vector(&self) -> bool {
        matches!(self, Type::Vector(_, elem) if elem.is_ptr())
    }

    /// Check if this is an aggregate type
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Array(_, _) | Type::Struct { .. })
    }

    /// Element type reached by indexing into this type with a sequential index.
    pub fn sequential_element(&self) -> Option<&Type> {
        match self {
            Type::Array(_, elem) | Type::Vector(_, elem) => Some(elem),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Ptr => write!(f, "ptr"),
            Type::Array(n, elem) => write!(f, "[{} x {}]", n, elem),
            Type::Vector(n, elem) => write!(f, "<{} x {}>", n, elem),
            Type::Struct { fields, packed } => {
                if *packed {
                    write!(f, "<")?;
                }
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")?;
                if *packed {
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Function { ret, params, varargs } => {
                write!(f, "{} (", ret)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                if *varargs {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_width() {
        assert_eq!(Type::Int(32).bit_width(), 32);
        assert_eq!(Type::Int(64).bit_width(), 64);
        assert_eq!(Type::Ptr.bit_width(), 0);
    }

    #[test]
    fn test_ptr_vector() {
        assert!(Type::vector(4, Type::Ptr).is_ptr_vector());
        assert!(!Type::vector(4, Type::i32()).is_ptr_vector());
        assert!(!Type::Ptr.is_ptr_vector());
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::array(10, Type::i32()).to_string(), "[10 x i32]");
        assert_eq!(
            Type::struct_of(vec![Type::i8(), Type::Ptr]).to_string(),
            "{ i8, ptr }"
        );
        assert_eq!(Type::vector(2, Type::Ptr).to_string(), "<2 x ptr>");
    }
}
