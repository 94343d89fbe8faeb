//! Human-readable names for module definitions, stored in the standard "name" custom section.

use crate::leb128;
use crate::model::module::{CustomSection, Module, OrderedSectionId};

/// The names attached to a single function: the function's own name plus names for its locals
/// (including parameters) and its control-structure labels.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FunctionNames {
    pub name: String,
    pub locals: Vec<String>,
    pub labels: Vec<String>,
}

/// A parallel structure keyed by IR index, giving human names for every index space the "name"
/// custom section covers. An empty string means the index has no name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DisassemblyNames {
    pub module_name: String,
    pub types: Vec<String>,
    pub functions: Vec<FunctionNames>,
    pub tables: Vec<String>,
    pub memories: Vec<String>,
    pub globals: Vec<String>,
    pub elem_segments: Vec<String>,
    pub data_segments: Vec<String>,
    pub exception_types: Vec<String>,
}

impl DisassemblyNames {
    /// Creates a name structure sized to the given module's index spaces.
    pub fn for_module(module: &Module) -> Self {
        DisassemblyNames {
            module_name: String::new(),
            types: vec![String::new(); module.types.len()],
            functions: vec![FunctionNames::default(); module.functions.size() as usize],
            tables: vec![String::new(); module.tables.size() as usize],
            memories: vec![String::new(); module.memories.size() as usize],
            globals: vec![String::new(); module.globals.size() as usize],
            elem_segments: vec![String::new(); module.elem_segments.len()],
            data_segments: vec![String::new(); module.data_segments.len()],
            exception_types: vec![String::new(); module.exception_types.size() as usize],
        }
    }

    /// Whether no name in the structure is set.
    pub fn is_empty(&self) -> bool {
        self.module_name.is_empty()
            && self.types.iter().all(String::is_empty)
            && self
                .functions
                .iter()
                .all(|f| f.name.is_empty() && f.locals.iter().all(String::is_empty) && f.labels.iter().all(String::is_empty))
            && self.tables.iter().all(String::is_empty)
            && self.memories.iter().all(String::is_empty)
            && self.globals.iter().all(String::is_empty)
            && self.elem_segments.iter().all(String::is_empty)
            && self.data_segments.iter().all(String::is_empty)
            && self.exception_types.iter().all(String::is_empty)
    }
}

// Subsection identifiers of the name section, including the extended-names proposal.
const MODULE_NAME: u8 = 0;
const FUNCTION_NAMES: u8 = 1;
const LOCAL_NAMES: u8 = 2;
const LABEL_NAMES: u8 = 3;
const TYPE_NAMES: u8 = 4;
const TABLE_NAMES: u8 = 5;
const MEMORY_NAMES: u8 = 6;
const GLOBAL_NAMES: u8 = 7;
const ELEM_NAMES: u8 = 8;
const DATA_NAMES: u8 = 9;
const TAG_NAMES: u8 = 11;

/// Reads the module's "name" custom section into a [`DisassemblyNames`] structure sized to the
/// module's index spaces. Absent or malformed name data yields empty names.
pub fn get_disassembly_names(module: &Module) -> DisassemblyNames {
    let mut names = DisassemblyNames::for_module(module);
    if let Some(section) = module.custom_section("name") {
        // Tolerate malformed name data: whatever decoded before the error is kept.
        let _ = decode_name_section(&section.data, &mut names);
    }
    names
}

/// Serializes the names into the module's "name" custom section, replacing any existing one.
/// Extended name subsections are only written when the module's feature spec enables them.
/// If every name is empty, the section is removed instead.
pub fn set_disassembly_names(module: &mut Module, names: &DisassemblyNames) {
    module.remove_custom_sections("name");

    if names.is_empty() {
        return;
    }

    let data = encode_name_section(names, module.feature_spec.extended_names_section);
    module.custom_sections.push(CustomSection {
        after_section: OrderedSectionId::Data,
        name: "name".to_string(),
        data,
    });
}

/// Decodes a "name" custom section payload into `names`, which must already be sized to the
/// module's index spaces; entries whose index is out of range are an error.
pub fn decode_name_section(mut input: &[u8], names: &mut DisassemblyNames) -> Result<(), String> {
    let mut last_id = None;
    while !input.is_empty() {
        let (rest, id) = read_byte(input)?;
        let (rest, size) = read_u32(rest)?;
        let size = size as usize;
        if size > rest.len() {
            return Err("name subsection size overruns the section".to_string());
        }
        let (payload, rest) = rest.split_at(size);

        if let Some(last) = last_id {
            if id <= last {
                return Err(format!("name subsection {id} out of order"));
            }
        }
        last_id = Some(id);

        match id {
            MODULE_NAME => {
                let (payload, name) = read_name(payload)?;
                expect_empty(payload)?;
                names.module_name = name;
            }
            FUNCTION_NAMES => {
                read_name_map(payload, |index, name| {
                    assign_function_name(&mut names.functions, index, name)
                })?;
            }
            LOCAL_NAMES => read_indirect_name_map(payload, &mut names.functions, |f| &mut f.locals)?,
            LABEL_NAMES => read_indirect_name_map(payload, &mut names.functions, |f| &mut f.labels)?,
            TYPE_NAMES => read_flat_name_map(payload, &mut names.types)?,
            TABLE_NAMES => read_flat_name_map(payload, &mut names.tables)?,
            MEMORY_NAMES => read_flat_name_map(payload, &mut names.memories)?,
            GLOBAL_NAMES => read_flat_name_map(payload, &mut names.globals)?,
            ELEM_NAMES => read_flat_name_map(payload, &mut names.elem_segments)?,
            DATA_NAMES => read_flat_name_map(payload, &mut names.data_segments)?,
            TAG_NAMES => read_flat_name_map(payload, &mut names.exception_types)?,
            _ => {
                // Unknown subsections are skipped.
            }
        }

        input = rest;
    }
    Ok(())
}

fn assign_function_name(
    functions: &mut [FunctionNames],
    index: u32,
    name: String,
) -> Result<(), String> {
    functions
        .get_mut(index as usize)
        .map(|f| f.name = name)
        .ok_or_else(|| format!("function name index {index} out of range"))
}

fn read_name_map(
    mut input: &[u8],
    mut assign: impl FnMut(u32, String) -> Result<(), String>,
) -> Result<(), String> {
    let (rest, count) = read_u32(input)?;
    input = rest;
    for _ in 0..count {
        let (rest, index) = read_u32(input)?;
        let (rest, name) = read_name(rest)?;
        assign(index, name)?;
        input = rest;
    }
    expect_empty(input)
}

fn read_flat_name_map(input: &[u8], names: &mut [String]) -> Result<(), String> {
    read_name_map(input, |index, name| {
        names
            .get_mut(index as usize)
            .map(|slot| *slot = name)
            .ok_or_else(|| format!("name index {index} out of range"))
    })
}

fn read_indirect_name_map(
    mut input: &[u8],
    functions: &mut [FunctionNames],
    select: impl Fn(&mut FunctionNames) -> &mut Vec<String>,
) -> Result<(), String> {
    let (rest, count) = read_u32(input)?;
    input = rest;
    for _ in 0..count {
        let (rest, function_index) = read_u32(input)?;
        let function = functions
            .get_mut(function_index as usize)
            .ok_or_else(|| format!("function index {function_index} out of range"))?;
        let inner = select(function);

        let (mut rest, inner_count) = read_u32(rest)?;
        for _ in 0..inner_count {
            let (after_index, index) = read_u32(rest)?;
            let (after_name, name) = read_name(after_index)?;
            let index = index as usize;
            if index >= inner.len() {
                inner.resize(index + 1, String::new());
            }
            inner[index] = name;
            rest = after_name;
        }
        input = rest;
    }
    expect_empty(input)
}

/// Encodes the names as a "name" custom section payload, skipping empty subsections.
pub fn encode_name_section(names: &DisassemblyNames, extended: bool) -> Vec<u8> {
    let mut output = Vec::new();

    if !names.module_name.is_empty() {
        let mut payload = Vec::new();
        write_name(&mut payload, &names.module_name);
        write_subsection(&mut output, MODULE_NAME, &payload);
    }

    let function_entries: Vec<(u32, &str)> = names
        .functions
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.name.is_empty())
        .map(|(index, f)| (index as u32, f.name.as_str()))
        .collect();
    if !function_entries.is_empty() {
        let mut payload = Vec::new();
        write_name_map(&mut payload, &function_entries);
        write_subsection(&mut output, FUNCTION_NAMES, &payload);
    }

    write_indirect_subsection(&mut output, LOCAL_NAMES, &names.functions, |f| &f.locals);

    if extended {
        write_indirect_subsection(&mut output, LABEL_NAMES, &names.functions, |f| &f.labels);
        write_flat_subsection(&mut output, TYPE_NAMES, &names.types);
        write_flat_subsection(&mut output, TABLE_NAMES, &names.tables);
        write_flat_subsection(&mut output, MEMORY_NAMES, &names.memories);
        write_flat_subsection(&mut output, GLOBAL_NAMES, &names.globals);
        write_flat_subsection(&mut output, ELEM_NAMES, &names.elem_segments);
        write_flat_subsection(&mut output, DATA_NAMES, &names.data_segments);
        write_flat_subsection(&mut output, TAG_NAMES, &names.exception_types);
    }

    output
}

fn write_flat_subsection(output: &mut Vec<u8>, id: u8, names: &[String]) {
    let entries: Vec<(u32, &str)> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.is_empty())
        .map(|(index, name)| (index as u32, name.as_str()))
        .collect();
    if entries.is_empty() {
        return;
    }

    let mut payload = Vec::new();
    write_name_map(&mut payload, &entries);
    write_subsection(output, id, &payload);
}

fn write_indirect_subsection(
    output: &mut Vec<u8>,
    id: u8,
    functions: &[FunctionNames],
    select: impl Fn(&FunctionNames) -> &Vec<String>,
) {
    let function_entries: Vec<(u32, Vec<(u32, &str)>)> = functions
        .iter()
        .enumerate()
        .filter_map(|(function_index, f)| {
            let inner: Vec<(u32, &str)> = select(f)
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.is_empty())
                .map(|(index, name)| (index as u32, name.as_str()))
                .collect();
            (!inner.is_empty()).then_some((function_index as u32, inner))
        })
        .collect();
    if function_entries.is_empty() {
        return;
    }

    let mut payload = Vec::new();
    write_u32(&mut payload, function_entries.len() as u32);
    for (function_index, inner) in &function_entries {
        write_u32(&mut payload, *function_index);
        write_name_map(&mut payload, inner);
    }
    write_subsection(output, id, &payload);
}

fn write_subsection(output: &mut Vec<u8>, id: u8, payload: &[u8]) {
    output.push(id);
    write_u32(output, payload.len() as u32);
    output.extend_from_slice(payload);
}

fn write_name_map(output: &mut Vec<u8>, entries: &[(u32, &str)]) {
    write_u32(output, entries.len() as u32);
    for (index, name) in entries {
        write_u32(output, *index);
        write_name(output, name);
    }
}

fn write_u32(output: &mut Vec<u8>, value: u32) {
    leb128::encode_unsigned(value, output).expect("writing to a Vec cannot fail");
}

fn write_name(output: &mut Vec<u8>, name: &str) {
    write_u32(output, name.len() as u32);
    output.extend_from_slice(name.as_bytes());
}

fn read_byte(input: &[u8]) -> Result<(&[u8], u8), String> {
    input
        .split_first()
        .map(|(&byte, rest)| (rest, byte))
        .ok_or_else(|| "unexpected end of name section".to_string())
}

fn read_u32(input: &[u8]) -> Result<(&[u8], u32), String> {
    leb128::parse_unsigned(input).map_err(|error| error.to_string())
}

fn read_name(input: &[u8]) -> Result<(&[u8], String), String> {
    let (input, length) = read_u32(input)?;
    let length = length as usize;
    if length > input.len() {
        return Err("name length overruns the section".to_string());
    }
    let (bytes, rest) = input.split_at(length);
    let name = std::str::from_utf8(bytes)
        .map_err(|_| "name is not valid UTF-8".to_string())?
        .to_string();
    Ok((rest, name))
}

fn expect_empty(input: &[u8]) -> Result<(), String> {
    if input.is_empty() {
        Ok(())
    } else {
        Err("trailing bytes in name subsection".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSpec;

    fn module_with_two_functions() -> Module {
        let mut module = Module::new(FeatureSpec::default());
        module.types.push(crate::model::types::FunctionType::runnable());
        module.functions.push_def(crate::model::module::FunctionDef {
            type_index: 0,
            ..Default::default()
        });
        module.functions.push_def(crate::model::module::FunctionDef {
            type_index: 0,
            ..Default::default()
        });
        module
    }

    #[test]
    fn round_trip_through_custom_section() {
        let mut module = module_with_two_functions();
        let mut names = DisassemblyNames::for_module(&module);
        names.module_name = "demo".to_string();
        names.functions[0].name = "first".to_string();
        names.functions[1].name = "second".to_string();
        names.functions[1].locals = vec!["x".to_string(), String::new(), "y".to_string()];

        set_disassembly_names(&mut module, &names);
        let read_back = get_disassembly_names(&module);

        assert_eq!(read_back.module_name, "demo");
        assert_eq!(read_back.functions[0].name, "first");
        assert_eq!(read_back.functions[1].name, "second");
        assert_eq!(read_back.functions[1].locals[0], "x");
        assert_eq!(read_back.functions[1].locals[2], "y");
    }

    #[test]
    fn empty_names_remove_the_section() {
        let mut module = module_with_two_functions();
        let names = DisassemblyNames::for_module(&module);

        set_disassembly_names(&mut module, &names);

        assert!(module.custom_section("name").is_none());
    }

    #[test]
    fn out_of_range_function_name_is_an_error() {
        let module = module_with_two_functions();
        let mut names = DisassemblyNames::for_module(&module);

        // A function-names subsection naming function index 9.
        let mut payload = Vec::new();
        write_name_map(&mut payload, &[(9, "ghost")]);
        let mut section = Vec::new();
        write_subsection(&mut section, FUNCTION_NAMES, &payload);

        assert!(decode_name_section(&section, &mut names).is_err());
    }

    #[test]
    fn extended_subsections_are_gated() {
        let mut module = module_with_two_functions();
        module.feature_spec.extended_names_section = false;
        let mut names = DisassemblyNames::for_module(&module);
        names.functions[0].name = "kept".to_string();
        names.functions[0].labels = vec!["dropped".to_string()];

        set_disassembly_names(&mut module, &names);
        let read_back = get_disassembly_names(&module);

        assert_eq!(read_back.functions[0].name, "kept");
        assert!(read_back.functions[0].labels.iter().all(String::is_empty));
    }
}
