//! Host-CPU kernel wrapping [crate::allocator] in the buffer-and-attribute calling
//! convention of an operator framework.
//!
//! The kernel takes three flat input buffers (`index`, `count`, `offset`), one integer
//! attribute (`total_limit`), and writes two preallocated output buffers
//! (`limited_count`, `offset`). Element kinds are resolved once here.

use crate::allocator::{allocate_into, AllocError};
use crate::common::{Dtype, Element};

use log::debug;
use std::collections::BTreeMap;
use std::fmt;

pub const TOTAL_LIMIT_ATTR: &str = "total_limit";

macro_rules! host_buffer_cases {
    ($($dtype:ident, $t:ty),*) => {
        /// A flat host-memory buffer of one of the supported [Dtype]s.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum HostBuffer {
            $( $dtype(Vec<$t>), )*
        }

        impl HostBuffer {
            /// A zero-filled buffer of the given kind and length.
            pub fn zeros(dtype: Dtype, len: usize) -> Self {
                match dtype {
                    $( Dtype::$dtype => HostBuffer::$dtype(vec![0; len]), )*
                }
            }

            pub fn dtype(&self) -> Dtype {
                match self {
                    $( HostBuffer::$dtype(_) => Dtype::$dtype, )*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $( HostBuffer::$dtype(v) => v.len(), )*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }

        $(
            impl From<Vec<$t>> for HostBuffer {
                fn from(v: Vec<$t>) -> Self {
                    HostBuffer::$dtype(v)
                }
            }

            impl BufferElement for $t {
                fn view(buffer: &HostBuffer) -> Option<&[Self]> {
                    match buffer {
                        HostBuffer::$dtype(v) => Some(v.as_slice()),
                        _ => None,
                    }
                }

                fn unwrap_vec(buffer: HostBuffer) -> Option<Vec<Self>> {
                    match buffer {
                        HostBuffer::$dtype(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

/// An [Element] which can be viewed inside a [HostBuffer] of its own [Dtype].
pub trait BufferElement: Element {
    fn view(buffer: &HostBuffer) -> Option<&[Self]>;
    fn unwrap_vec(buffer: HostBuffer) -> Option<Vec<Self>>;
}

host_buffer_cases!(Sint32, i32, Uint32, u32, Sint64, i64);

impl HostBuffer {
    /// Borrow the contents if this buffer holds `T`s.
    pub fn as_slice<T: BufferElement>(&self) -> Option<&[T]> {
        T::view(self)
    }

    pub fn into_vec<T: BufferElement>(self) -> Option<Vec<T>> {
        T::unwrap_vec(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Int(i64),
    Str(String),
}

pub type Attrs = BTreeMap<String, AttrValue>;

#[derive(Debug, Default, Clone)]
pub struct KernelInputs {
    pub index: Option<HostBuffer>,
    pub count: Option<HostBuffer>,
    pub offset: Option<HostBuffer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelOutputs {
    pub limited_count: HostBuffer,
    pub offset: HostBuffer,
}

/// Limits per-bucket counts so that their sum fits within `total_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimitKernel {
    total_limit: i64,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum KernelError {
    #[error("Missing required input '{0}'")]
    MissingInput(&'static str),
    #[error("Missing required attribute '{0}'")]
    MissingAttr(&'static str),
    #[error("Attribute '{name}' should be an integer, but was {found}")]
    AttrType { name: &'static str, found: AttrValue },
    #[error("Buffer '{name}' has dtype {found}, but {expected} was expected")]
    DtypeMismatch {
        name: &'static str,
        expected: Dtype,
        found: Dtype,
    },
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl KernelInputs {
    pub fn new(index: HostBuffer, count: HostBuffer, offset: HostBuffer) -> Self {
        KernelInputs {
            index: Some(index),
            count: Some(count),
            offset: Some(offset),
        }
    }

    fn require(&self) -> Result<(&HostBuffer, &HostBuffer, &HostBuffer), KernelError> {
        let index = self.index.as_ref().ok_or(KernelError::MissingInput("index"))?;
        let count = self.count.as_ref().ok_or(KernelError::MissingInput("count"))?;
        let offset = self
            .offset
            .as_ref()
            .ok_or(KernelError::MissingInput("offset"))?;
        Ok((index, count, offset))
    }
}

impl KernelOutputs {
    /// Zeroed outputs matching the `index` input's kind and length.
    pub fn for_inputs(inputs: &KernelInputs) -> Result<Self, KernelError> {
        let index = inputs
            .index
            .as_ref()
            .ok_or(KernelError::MissingInput("index"))?;
        Ok(KernelOutputs {
            limited_count: HostBuffer::zeros(index.dtype(), index.len()),
            offset: HostBuffer::zeros(index.dtype(), index.len()),
        })
    }
}

impl BucketLimitKernel {
    pub fn new(total_limit: i64) -> Result<Self, KernelError> {
        if total_limit < 0 {
            return Err(AllocError::InvalidBudget(total_limit).into());
        }
        Ok(BucketLimitKernel { total_limit })
    }

    pub fn from_attrs(attrs: &Attrs) -> Result<Self, KernelError> {
        match attrs.get(TOTAL_LIMIT_ATTR) {
            None => Err(KernelError::MissingAttr(TOTAL_LIMIT_ATTR)),
            Some(AttrValue::Int(v)) => Self::new(*v),
            Some(other) => Err(KernelError::AttrType {
                name: TOTAL_LIMIT_ATTR,
                found: other.clone(),
            }),
        }
    }

    /// Run the allocation, writing into `outputs`.
    ///
    /// Returns the water level used. On error, `outputs` are left unmodified.
    pub fn compute(
        &self,
        inputs: &KernelInputs,
        outputs: &mut KernelOutputs,
    ) -> Result<i64, KernelError> {
        let (index, count, offset) = inputs.require()?;
        let expected = index.dtype();
        let dtypes = [
            ("index", expected),
            ("count", count.dtype()),
            ("offset", offset.dtype()),
            ("limited_count", outputs.limited_count.dtype()),
            ("offset", outputs.offset.dtype()),
        ];
        debug!(
            "Running bucket limit over {} positions ({expected}), {} buckets, limit {}",
            index.len(),
            count.len(),
            self.total_limit
        );

        let level = match (index, count, offset, &mut outputs.limited_count, &mut outputs.offset) {
            (
                HostBuffer::Sint32(i),
                HostBuffer::Sint32(c),
                HostBuffer::Sint32(o),
                HostBuffer::Sint32(co),
                HostBuffer::Sint32(oo),
            ) => allocate_into(i, c, o, self.total_limit, co, oo)?,
            (
                HostBuffer::Uint32(i),
                HostBuffer::Uint32(c),
                HostBuffer::Uint32(o),
                HostBuffer::Uint32(co),
                HostBuffer::Uint32(oo),
            ) => allocate_into(i, c, o, self.total_limit, co, oo)?,
            (
                HostBuffer::Sint64(i),
                HostBuffer::Sint64(c),
                HostBuffer::Sint64(o),
                HostBuffer::Sint64(co),
                HostBuffer::Sint64(oo),
            ) => allocate_into(i, c, o, self.total_limit, co, oo)?,
            _ => {
                let (name, found) = dtypes
                    .into_iter()
                    .find(|&(_, found)| found != expected)
                    .unwrap_or(dtypes[0]);
                return Err(KernelError::DtypeMismatch {
                    name,
                    expected,
                    found,
                });
            }
        };
        Ok(level)
    }
}
