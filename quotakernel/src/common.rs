use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

/// The element kind carried by a host buffer.
///
/// Bucket indices, counts, and offsets all share one kind per kernel call. The
/// allocator itself works in `i64`; a [Dtype] is resolved once at the kernel
/// boundary and never flows into the allocation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum Dtype {
    #[default]
    #[serde(rename = "i32")]
    #[cfg_attr(feature = "clap", value(name = "i32"))]
    Sint32,
    #[serde(rename = "u32")]
    #[cfg_attr(feature = "clap", value(name = "u32"))]
    Uint32,
    #[serde(rename = "i64")]
    #[cfg_attr(feature = "clap", value(name = "i64"))]
    Sint64,
}

/// An integer type which may back a [crate::kernel::HostBuffer].
///
/// Every implementor widens losslessly into `i64`, the allocator's working width.
pub trait Element: Copy + Ord + Default + Debug + Display + Send + Sync + 'static {
    const DTYPE: Dtype;

    fn widen(self) -> i64;

    /// Returns `None` if `value` is not representable as `Self`.
    fn narrow(value: i64) -> Option<Self>;
}

impl Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::Sint32 => write!(f, "i32"),
            Dtype::Uint32 => write!(f, "u32"),
            Dtype::Sint64 => write!(f, "i64"),
        }
    }
}

macro_rules! impl_element {
    ($($t:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: Dtype = Dtype::$dtype;

                #[inline]
                fn widen(self) -> i64 {
                    i64::from(self)
                }

                #[inline]
                fn narrow(value: i64) -> Option<Self> {
                    <$t>::try_from(value).ok()
                }
            }
        )*
    };
}

impl_element!(i32 => Sint32, u32 => Uint32, i64 => Sint64);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_dtype_display_matches_serde_names() {
        for dtype in [Dtype::Sint32, Dtype::Uint32, Dtype::Sint64] {
            let serialized = serde_json::to_string(&dtype).unwrap();
            assert_eq!(serialized, format!("\"{dtype}\""));
        }
    }

    #[test]
    fn test_narrow_rejects_unrepresentable_values() {
        assert_eq!(i32::narrow(i64::from(i32::MAX) + 1), None);
        assert_eq!(u32::narrow(-1), None);
        assert_eq!(u32::narrow(i64::from(u32::MAX)), Some(u32::MAX));
        assert_eq!(i64::narrow(i64::MIN), Some(i64::MIN));
    }

    proptest! {
        #[test]
        fn test_i32_widen_then_narrow_is_identity(value in any::<i32>()) {
            prop_assert_eq!(i32::narrow(value.widen()), Some(value));
        }
    }
}
