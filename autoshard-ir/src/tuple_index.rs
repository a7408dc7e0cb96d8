use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Path to an element of a (possibly nested) tuple value.
///
/// The empty index refers to the tuple itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TupleIndex(Vec<usize>);

impl TupleIndex {
    pub fn new(path: impl Into<Vec<usize>>) -> Self {
        Self(path.into())
    }

    pub fn elements(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for TupleIndex {
    fn from(value: Vec<usize>) -> Self {
        Self::new(value)
    }
}

impl<const N: usize> From<[usize; N]> for TupleIndex {
    fn from(value: [usize; N]) -> Self {
        Self::new(value)
    }
}

impl Display for TupleIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{element}")?;
        }
        write!(f, "}}")
    }
}
