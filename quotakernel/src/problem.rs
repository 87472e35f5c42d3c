use crate::common::{Dtype, Element};
use crate::kernel::{AttrValue, Attrs, HostBuffer, KernelInputs, TOTAL_LIMIT_ATTR};

use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};

/// A self-contained description of one bucket-limit invocation.
///
/// Values are held as `i64` and narrowed to [Problem::dtype] when converted into
/// kernel inputs.
///
/// # Examples
/// ```
/// # use quotakernel::problem::Problem;
/// let problem: Problem = r#"{"index": [0, 1], "demand": [4, 9], "aux": [0, 4], "budget": 10}"#
///     .parse()
///     .unwrap();
/// assert_eq!(problem.budget, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Problem {
    #[serde(default)]
    pub dtype: Dtype,
    pub index: Vec<i64>,
    pub demand: Vec<i64>,
    pub aux: Vec<i64>,
    pub budget: i64,
}

#[derive(thiserror::Error, Debug)]
pub enum ProblemError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed problem: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Value {value} at position {position} of '{field}' does not fit in {dtype}")]
    Narrowing {
        field: &'static str,
        position: usize,
        value: i64,
        dtype: Dtype,
    },
}

impl Problem {
    pub fn load(path: &Path) -> Result<Self, ProblemError> {
        log::info!("Loading problem from: {}", path.display());
        let contents = fs::read_to_string(path)?;
        contents.parse()
    }

    pub fn attrs(&self) -> Attrs {
        Attrs::from([(TOTAL_LIMIT_ATTR.to_string(), AttrValue::Int(self.budget))])
    }

    /// Narrow the three tables to [Problem::dtype].
    pub fn to_inputs(&self) -> Result<KernelInputs, ProblemError> {
        Ok(KernelInputs::new(
            self.buffer("index", &self.index)?,
            self.buffer("demand", &self.demand)?,
            self.buffer("aux", &self.aux)?,
        ))
    }

    fn buffer(&self, field: &'static str, values: &[i64]) -> Result<HostBuffer, ProblemError> {
        match self.dtype {
            Dtype::Sint32 => narrow_all::<i32>(field, values).map(HostBuffer::from),
            Dtype::Uint32 => narrow_all::<u32>(field, values).map(HostBuffer::from),
            Dtype::Sint64 => Ok(HostBuffer::from(values.to_vec())),
        }
    }
}

impl std::str::FromStr for Problem {
    type Err = ProblemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

fn narrow_all<T: Element>(field: &'static str, values: &[i64]) -> Result<Vec<T>, ProblemError> {
    values
        .iter()
        .enumerate()
        .map(|(position, &value)| {
            T::narrow(value).ok_or(ProblemError::Narrowing {
                field,
                position,
                value,
                dtype: T::DTYPE,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_dtype_defaults_to_i32() {
        let problem: Problem = r#"{"index": [], "demand": [], "aux": [], "budget": 0}"#
            .parse()
            .unwrap();
        assert_eq!(problem.dtype, Dtype::Sint32);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = r#"{"index": [], "demand": [], "aux": [], "budget": 0, "limit": 3}"#
            .parse::<Problem>()
            .unwrap_err();
        assert!(matches!(err, ProblemError::Parse(_)));
    }

    #[test]
    fn test_to_inputs_narrows_to_dtype() {
        let problem: Problem =
            r#"{"dtype": "u32", "index": [1, 0], "demand": [3, 4], "aux": [5, 6], "budget": 2}"#
                .parse()
                .unwrap();
        let inputs = problem.to_inputs().unwrap();
        assert_eq!(inputs.index, Some(HostBuffer::Uint32(vec![1, 0])));
        assert_eq!(inputs.count, Some(HostBuffer::Uint32(vec![3, 4])));
        assert_eq!(inputs.offset, Some(HostBuffer::Uint32(vec![5, 6])));
        assert_eq!(problem.attrs()[TOTAL_LIMIT_ATTR], AttrValue::Int(2));
    }

    #[test]
    fn test_unrepresentable_value_is_reported() {
        let problem = Problem {
            dtype: Dtype::Uint32,
            index: vec![0],
            demand: vec![1],
            aux: vec![4, -2],
            budget: 1,
        };
        let err = problem.to_inputs().unwrap_err();
        assert!(matches!(
            err,
            ProblemError::Narrowing {
                field: "aux",
                position: 1,
                value: -2,
                dtype: Dtype::Uint32,
            }
        ));
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"dtype": "i64", "index": [0], "demand": [8], "aux": [1], "budget": 3}}"#
        )
        .unwrap();
        let problem = Problem::load(file.path()).unwrap();
        assert_eq!(
            problem,
            Problem {
                dtype: Dtype::Sint64,
                index: vec![0],
                demand: vec![8],
                aux: vec![1],
                budget: 3,
            }
        );
    }
}
