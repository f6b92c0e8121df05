//! Loads an architecture description from TOML.
//!
//! IDL bodies are kept with the line on which they start so that diagnostics point into the
//! TOML file. Global IDL files referenced by path are resolved relative to the TOML file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use toml::Spanned;
use tracing::debug;

use crate::arch::config::parse_version;
use crate::arch::{
    Architecture, Csr, CsrField, CsrLength, DecodeVariable, Extension, ExtensionVersion,
    FieldAccess, FieldLocation, IdlSource, Instruction, ParamKind, TrapCode, TrapKind,
};
use crate::idl::error::{IdlError, IdlResult};
use crate::idl::types::BitRange;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArchFile {
    name: String,
    #[serde(default)]
    params: IndexMap<String, ParamKindEntry>,
    #[serde(default)]
    extensions: Vec<ExtensionEntry>,
    #[serde(default)]
    exceptions: Vec<TrapEntry>,
    #[serde(default)]
    interrupts: Vec<TrapEntry>,
    #[serde(default)]
    csrs: Vec<CsrEntry>,
    #[serde(default)]
    instructions: Vec<InstructionEntry>,
    #[serde(default)]
    globals: Vec<GlobalEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ParamKindEntry {
    Integer,
    Boolean,
    String,
}

#[derive(Debug, Deserialize)]
struct ExtensionEntry {
    name: String,
    #[serde(default)]
    versions: Vec<String>,
    #[serde(default = "default_true")]
    ratified: bool,
}

#[derive(Debug, Deserialize)]
struct TrapEntry {
    name: String,
    var: String,
    num: u32,
    defined_by: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LengthEntry {
    Fixed(u32),
    Named(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CsrEntry {
    name: String,
    #[serde(default)]
    address: Option<u32>,
    length: LengthEntry,
    defined_by: String,
    #[serde(default)]
    sw_read: Option<Spanned<String>>,
    #[serde(default)]
    fields: Vec<FieldEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldEntry {
    name: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    location_rv32: Option<String>,
    #[serde(default)]
    location_rv64: Option<String>,
    #[serde(rename = "type")]
    access: String,
    #[serde(default)]
    sw_write: Option<Spanned<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstructionEntry {
    name: String,
    defined_by: String,
    #[serde(default = "default_encoding_width")]
    encoding_width: u32,
    #[serde(default)]
    variables: Vec<VariableEntry>,
    #[serde(default)]
    operation: Option<Spanned<String>>,
}

#[derive(Debug, Deserialize)]
struct VariableEntry {
    name: String,
    /// `|`-separated ranges, most significant first, e.g. `31|7|30-25|11-8`.
    location: String,
    #[serde(default)]
    left_shift: u32,
    #[serde(default)]
    sign_extend: bool,
}

/// Either `path` to an IDL file or inline `text`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GlobalEntry {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    text: Option<Spanned<String>>,
}

fn default_true() -> bool {
    true
}

fn default_encoding_width() -> u32 {
    32
}

#[derive(Default)]
pub struct ArchLoader {
    visited: BTreeSet<PathBuf>,
}

impl ArchLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> IdlResult<Architecture> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        self.load_str(&text, path)
    }

    /// Parses `text` as if it had been read from `path`.
    pub fn load_str(&mut self, text: &str, path: &Path) -> IdlResult<Architecture> {
        self.visited.clear();
        let file: ArchFile = toml::from_str(text)?;
        debug!(
            arch = %file.name,
            csrs = file.csrs.len(),
            instructions = file.instructions.len(),
            "loaded architecture description"
        );
        let source = SourceText { text, path };

        let mut builder = Architecture::builder(file.name.clone());
        for (name, kind) in file.params {
            let kind = match kind {
                ParamKindEntry::Integer => ParamKind::Integer,
                ParamKindEntry::Boolean => ParamKind::Boolean,
                ParamKindEntry::String => ParamKind::String,
            };
            builder = builder.param(name, kind);
        }
        for ext in file.extensions {
            let versions = ext
                .versions
                .iter()
                .map(|raw| {
                    Ok(ExtensionVersion {
                        version: parse_version(raw)?,
                        ratified: ext.ratified,
                    })
                })
                .collect::<IdlResult<Vec<_>>>()?;
            builder = builder.extension(Extension {
                name: ext.name,
                versions,
            });
        }
        for (kind, entries) in [
            (TrapKind::Exception, file.exceptions),
            (TrapKind::Interrupt, file.interrupts),
        ] {
            for entry in entries {
                builder = builder.trap(TrapCode::new(
                    kind,
                    entry.name,
                    entry.var,
                    entry.num,
                    entry.defined_by,
                ));
            }
        }
        for entry in file.csrs {
            builder = builder.csr(convert_csr(entry, &source)?);
        }
        for entry in file.instructions {
            builder = builder.instruction(convert_instruction(entry, &source)?);
        }
        for entry in file.globals {
            match (entry.path, entry.text) {
                (None, Some(text)) => builder = builder.global(source.fragment(&text)),
                (Some(include), None) => {
                    let resolved = resolve_relative(path, &include);
                    if !self.visited.insert(resolved.clone()) {
                        continue;
                    }
                    let text = fs::read_to_string(&resolved)?;
                    builder = builder.global(IdlSource::new(text, &resolved, 1));
                }
                _ => {
                    return Err(IdlError::Architecture(
                        "a global entry needs exactly one of 'path' or 'text'".into(),
                    ));
                }
            }
        }
        builder.build()
    }
}

struct SourceText<'a> {
    text: &'a str,
    path: &'a Path,
}

impl SourceText<'_> {
    /// Fragment whose line number refers to where its text starts in the TOML file.
    fn fragment(&self, value: &Spanned<String>) -> IdlSource {
        let start = value.span().start.min(self.text.len());
        let mut line = self.text[..start].matches('\n').count() + 1;
        let raw = &self.text[start..];
        // A newline right after an opening `"""` is not part of the string.
        if (raw.starts_with("\"\"\"") || raw.starts_with("'''"))
            && raw[3..].trim_start_matches([' ', '\t', '\r']).starts_with('\n')
        {
            line += 1;
        }
        IdlSource::new(value.get_ref().clone(), self.path, line)
    }
}

fn resolve_relative(parent: &Path, include: &Path) -> PathBuf {
    if include.is_relative() {
        parent
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(include)
    } else {
        include.to_path_buf()
    }
}

fn parse_range(text: &str, context: &str) -> IdlResult<BitRange> {
    BitRange::parse(text).map_err(|err| IdlError::Architecture(format!("{context}: {err}")))
}

fn convert_csr(entry: CsrEntry, source: &SourceText<'_>) -> IdlResult<Csr> {
    let length = match entry.length {
        LengthEntry::Fixed(width) => CsrLength::Fixed(width),
        LengthEntry::Named(name) if name.ends_with("XLEN") => CsrLength::Xlen,
        LengthEntry::Named(name) => {
            return Err(IdlError::Architecture(format!(
                "CSR '{}' has unsupported length '{name}'",
                entry.name
            )));
        }
    };
    let mut fields = Vec::with_capacity(entry.fields.len());
    for field in entry.fields {
        let context = format!("CSR field {}.{}", entry.name, field.name);
        let location = match (field.location, field.location_rv32, field.location_rv64) {
            (Some(fixed), None, None) => FieldLocation::Fixed(parse_range(&fixed, &context)?),
            (None, Some(rv32), Some(rv64)) => FieldLocation::PerXlen {
                rv32: parse_range(&rv32, &context)?,
                rv64: parse_range(&rv64, &context)?,
            },
            _ => {
                return Err(IdlError::Architecture(format!(
                    "{context}: give either 'location' or both 'location_rv32' and 'location_rv64'"
                )));
            }
        };
        let access = FieldAccess::parse(&field.access).ok_or_else(|| {
            IdlError::Architecture(format!("{context}: unknown access type '{}'", field.access))
        })?;
        fields.push(CsrField {
            name: field.name,
            location,
            access,
            sw_write: field.sw_write.as_ref().map(|text| source.fragment(text)),
        });
    }
    Ok(Csr {
        name: entry.name,
        address: entry.address,
        length,
        defined_by: entry.defined_by,
        fields,
        sw_read: entry.sw_read.as_ref().map(|text| source.fragment(text)),
    })
}

fn convert_instruction(entry: InstructionEntry, source: &SourceText<'_>) -> IdlResult<Instruction> {
    let mut decode_variables = Vec::with_capacity(entry.variables.len());
    for var in entry.variables {
        let context = format!("decode variable {}.{}", entry.name, var.name);
        let segments = var
            .location
            .split('|')
            .map(|part| parse_range(part, &context))
            .collect::<IdlResult<Vec<_>>>()?;
        if let Some(bad) = segments.iter().find(|range| range.msb >= entry.encoding_width) {
            return Err(IdlError::Architecture(format!(
                "{context}: bit {} is outside the {}-bit encoding",
                bad.msb, entry.encoding_width
            )));
        }
        decode_variables.push(DecodeVariable {
            name: var.name,
            segments,
            left_shift: var.left_shift,
            sign_extend: var.sign_extend,
        });
    }
    Ok(Instruction {
        name: entry.name,
        defined_by: entry.defined_by,
        encoding_width: entry.encoding_width,
        decode_variables,
        operation: entry.operation.as_ref().map(|text| source.fragment(text)),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const ARCH: &str = r#"
name = "mini"

[params]
MXLEN = "integer"

[[extensions]]
name = "I"
versions = ["2.1"]

[[exceptions]]
name = "Illegal instruction"
var = "IllegalInstruction"
num = 2
defined_by = "I"

[[csrs]]
name = "mscratch"
address = 0x340
length = "MXLEN"
defined_by = "I"

[[csrs.fields]]
name = "SCRATCH"
location_rv32 = "31-0"
location_rv64 = "63-0"
type = "RW"
sw_write = """
return csr_value.SCRATCH;
"""

[[instructions]]
name = "addi"
defined_by = "I"
operation = """
X[rd] = X[rs1] + $signed(imm);
"""

[[instructions.variables]]
name = "rd"
location = "11-7"

[[instructions.variables]]
name = "imm"
location = "31-20"
sign_extend = true
"#;

    #[test]
    fn loads_records_with_fragment_lines() {
        let arch = ArchLoader::new()
            .load_str(ARCH, Path::new("mini.toml"))
            .expect("architecture");
        let csr = arch.csr("mscratch").expect("csr");
        assert_eq!(csr.length, CsrLength::Xlen);
        let field = csr.field("SCRATCH").expect("field");
        assert!(field.is_xlen_dependent());
        let sw_write = field.sw_write.as_ref().expect("sw_write");
        assert_eq!(sw_write.line, 29, "fragment starts on the line after the opening quotes");
        assert_eq!(sw_write.text.trim(), "return csr_value.SCRATCH;");

        let addi = arch.instruction("addi").expect("addi");
        assert_eq!(addi.decode_variables[1].width(), 12);
        assert_eq!(arch.exceptions.len(), 1);
    }

    #[test]
    fn resolves_global_files_relative_to_the_description() {
        let dir = tempfile::tempdir().expect("tempdir");
        let globals = dir.path().join("globals.idl");
        fs::File::create(&globals)
            .and_then(|mut file| file.write_all(b"Bits<7> OP = 7'b0110011;\n"))
            .expect("write globals");
        let arch_path = dir.path().join("arch.toml");
        fs::write(
            &arch_path,
            "name = \"tiny\"\n[[globals]]\npath = \"globals.idl\"\n[[globals]]\npath = \"globals.idl\"\n",
        )
        .expect("write arch");

        let arch = ArchLoader::new().load(&arch_path).expect("architecture");
        assert_eq!(arch.globals.len(), 1, "the same file is only loaded once");
        assert!(arch.globals[0].text.contains("OP"));
    }

    #[test]
    fn rejects_duplicate_trap_codes() {
        let text = r#"
name = "dup"
[[exceptions]]
name = "A"
var = "A"
num = 1
defined_by = "I"
[[exceptions]]
name = "B"
var = "B"
num = 1
defined_by = "I"
"#;
        let err = ArchLoader::new()
            .load_str(text, Path::new("dup.toml"))
            .expect_err("duplicate codes");
        assert!(matches!(err, IdlError::Architecture(_)));
    }
}
