//! Exception and interrupt code records.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::idl::error::{IdlError, IdlResult};
use crate::idl::types::{EnumDef, EnumMember};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    Exception,
    Interrupt,
}

impl TrapKind {
    /// Name of the IDL enum materialised from a table of this kind.
    pub fn enum_name(self) -> &'static str {
        match self {
            TrapKind::Exception => "ExceptionCode",
            TrapKind::Interrupt => "InterruptCode",
        }
    }
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapKind::Exception => f.write_str("exception"),
            TrapKind::Interrupt => f.write_str("interrupt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrapCode {
    pub kind: TrapKind,
    /// Human readable name, e.g. "Illegal instruction".
    pub name: String,
    /// Enum member name, e.g. `IllegalInstruction`.
    pub var: String,
    pub num: u32,
    /// Extension that defines the code.
    pub defined_by: String,
}

impl TrapCode {
    pub fn new(
        kind: TrapKind,
        name: impl Into<String>,
        var: impl Into<String>,
        num: u32,
        defined_by: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            var: var.into(),
            num,
            defined_by: defined_by.into(),
        }
    }
}

/// Codes of one kind, sorted by number, with unique numbers, names and member names.
#[derive(Debug, Clone)]
pub struct TrapCodeTable {
    kind: TrapKind,
    codes: Vec<Arc<TrapCode>>,
    by_var: AHashMap<String, usize>,
    enum_def: Arc<EnumDef>,
}

impl TrapCodeTable {
    pub fn new(kind: TrapKind, codes: Vec<TrapCode>) -> IdlResult<Self> {
        let mut sorted = codes;
        sorted.sort_by_key(|code| code.num);

        let mut by_var = AHashMap::with_capacity(sorted.len());
        let mut names = AHashMap::with_capacity(sorted.len());
        for (idx, code) in sorted.iter().enumerate() {
            if code.kind != kind {
                return Err(IdlError::Architecture(format!(
                    "{} '{}' listed among {kind} codes",
                    code.kind, code.var
                )));
            }
            if idx > 0 && sorted[idx - 1].num == code.num {
                return Err(IdlError::Architecture(format!(
                    "duplicate {kind} code {}: '{}' and '{}'",
                    code.num,
                    sorted[idx - 1].var,
                    code.var
                )));
            }
            if by_var.insert(code.var.clone(), idx).is_some() {
                return Err(IdlError::Architecture(format!(
                    "duplicate {kind} variable name '{}'",
                    code.var
                )));
            }
            if names.insert(code.name.clone(), idx).is_some() {
                return Err(IdlError::Architecture(format!(
                    "duplicate {kind} name '{}'",
                    code.name
                )));
            }
        }

        let members: SmallVec<[EnumMember; 8]> = sorted
            .iter()
            .map(|code| EnumMember {
                name: Arc::from(code.var.as_str()),
                value: u128::from(code.num),
            })
            .collect();
        let enum_def = Arc::new(EnumDef {
            name: Arc::from(kind.enum_name()),
            members,
        });

        Ok(Self {
            kind,
            codes: sorted.into_iter().map(Arc::new).collect(),
            by_var,
            enum_def,
        })
    }

    pub fn empty(kind: TrapKind) -> Self {
        Self {
            kind,
            codes: Vec::new(),
            by_var: AHashMap::new(),
            enum_def: Arc::new(EnumDef {
                name: Arc::from(kind.enum_name()),
                members: SmallVec::new(),
            }),
        }
    }

    pub fn kind(&self) -> TrapKind {
        self.kind
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TrapCode>> {
        self.codes.iter()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn by_var(&self, var: &str) -> Option<&Arc<TrapCode>> {
        self.by_var.get(var).map(|idx| &self.codes[*idx])
    }

    pub fn by_num(&self, num: u32) -> Option<&Arc<TrapCode>> {
        self.codes
            .binary_search_by_key(&num, |code| code.num)
            .ok()
            .map(|idx| &self.codes[idx])
    }

    pub fn enum_def(&self) -> &Arc<EnumDef> {
        &self.enum_def
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exception(var: &str, num: u32) -> TrapCode {
        TrapCode::new(TrapKind::Exception, var.to_lowercase(), var, num, "I")
    }

    #[test]
    fn sorts_codes_and_builds_enum() {
        let table = TrapCodeTable::new(
            TrapKind::Exception,
            vec![exception("IllegalInstruction", 2), exception("Breakpoint", 3), exception("InstructionAddressMisaligned", 0)],
        )
        .expect("table");
        let nums: Vec<u32> = table.iter().map(|code| code.num).collect();
        assert_eq!(nums, vec![0, 2, 3]);
        assert_eq!(table.enum_def().name.as_ref(), "ExceptionCode");
        assert_eq!(table.by_var("Breakpoint").map(|code| code.num), Some(3));
        assert_eq!(table.by_num(2).map(|code| code.var.as_str()), Some("IllegalInstruction"));
    }

    #[test]
    fn rejects_duplicate_numbers() {
        let err = TrapCodeTable::new(
            TrapKind::Exception,
            vec![exception("A", 1), exception("B", 1)],
        )
        .expect_err("duplicate number");
        assert!(err.to_string().contains("duplicate exception code 1"), "{err}");
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut second = exception("B", 2);
        second.name = "a".into();
        let err = TrapCodeTable::new(TrapKind::Exception, vec![exception("A", 1), second])
            .expect_err("duplicate name");
        assert!(err.to_string().contains("duplicate exception name 'a'"), "{err}");
    }

    #[test]
    fn rejects_mixed_kinds() {
        let interrupt = TrapCode::new(TrapKind::Interrupt, "timer", "MachineTimer", 7, "Sm");
        assert!(TrapCodeTable::new(TrapKind::Exception, vec![interrupt]).is_err());
    }
}
