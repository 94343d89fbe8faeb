//! Feature flags controlling which WebAssembly proposals are accepted.

/// A standard or proposed extension that an operator or construct may require.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Feature {
    Mvp,
    ImportExportMutableGlobals,
    NonTrappingFloatToInt,
    SignExtension,
    BulkMemoryOperations,
    Simd,
    Atomics,
    ExceptionHandling,
    MultipleResultsAndBlockParams,
    ReferenceTypes,
    ExtendedNamesSection,
    MultipleMemories,
    SharedTables,
}

/// Flags selecting which proposed WebAssembly extensions are accepted by the
/// parsers, the validator, and the binary codec, together with the maximums
/// that bound allocation while decoding untrusted input.
///
/// The default spec accepts the MVP plus the extensions that are likely to be
/// standardized without further changes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeatureSpec {
    // Proposed standard extensions that are likely to be standardized without
    // further changes.
    pub import_export_mutable_globals: bool,
    pub non_trapping_float_to_int: bool,
    pub sign_extension: bool,
    pub bulk_memory_operations: bool,

    // Proposed standard extensions.
    pub simd: bool,
    pub atomics: bool,
    pub exception_handling: bool,
    pub multiple_results_and_block_params: bool,
    pub reference_types: bool,
    pub extended_names_section: bool,
    pub multiple_memories: bool,

    // Non-standard extensions.
    pub shared_tables: bool,
    pub require_shared_flag_for_atomic_operators: bool,
    pub allow_legacy_instruction_names: bool,
    pub allow_any_extern_kind_elem_segments: bool,
    pub quoted_names_in_text_format: bool,
    pub custom_sections_in_text_format: bool,

    pub max_locals: usize,
    pub max_labels_per_function: usize,
    pub max_data_segments: usize,
    pub max_syntax_recursion: usize,
}

impl Default for FeatureSpec {
    fn default() -> Self {
        FeatureSpec {
            import_export_mutable_globals: true,
            non_trapping_float_to_int: true,
            sign_extension: true,
            bulk_memory_operations: true,
            simd: true,
            atomics: true,
            exception_handling: true,
            multiple_results_and_block_params: true,
            reference_types: true,
            extended_names_section: true,
            multiple_memories: true,
            shared_tables: false,
            require_shared_flag_for_atomic_operators: false,
            allow_legacy_instruction_names: false,
            allow_any_extern_kind_elem_segments: false,
            quoted_names_in_text_format: false,
            custom_sections_in_text_format: false,
            max_locals: 65536,
            max_labels_per_function: usize::MAX,
            max_data_segments: usize::MAX,
            max_syntax_recursion: 500,
        }
    }
}

impl FeatureSpec {
    /// A spec that accepts only the WebAssembly MVP.
    pub fn mvp() -> Self {
        FeatureSpec {
            import_export_mutable_globals: false,
            non_trapping_float_to_int: false,
            sign_extension: false,
            bulk_memory_operations: false,
            simd: false,
            atomics: false,
            exception_handling: false,
            multiple_results_and_block_params: false,
            reference_types: false,
            extended_names_section: false,
            multiple_memories: false,
            ..FeatureSpec::default()
        }
    }

    /// A spec that accepts every supported proposal, including the
    /// non-standard text format extensions.
    pub fn all() -> Self {
        FeatureSpec {
            shared_tables: true,
            allow_legacy_instruction_names: true,
            allow_any_extern_kind_elem_segments: true,
            quoted_names_in_text_format: true,
            custom_sections_in_text_format: true,
            ..FeatureSpec::default()
        }
    }

    /// Whether this spec accepts constructs requiring the given feature.
    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::Mvp => true,
            Feature::ImportExportMutableGlobals => self.import_export_mutable_globals,
            Feature::NonTrappingFloatToInt => self.non_trapping_float_to_int,
            Feature::SignExtension => self.sign_extension,
            Feature::BulkMemoryOperations => self.bulk_memory_operations,
            Feature::Simd => self.simd,
            Feature::Atomics => self.atomics,
            Feature::ExceptionHandling => self.exception_handling,
            Feature::MultipleResultsAndBlockParams => self.multiple_results_and_block_params,
            Feature::ReferenceTypes => self.reference_types,
            Feature::ExtendedNamesSection => self.extended_names_section,
            Feature::MultipleMemories => self.multiple_memories,
            Feature::SharedTables => self.shared_tables,
        }
    }

    /// Sets the named feature flag, as used by the `--enable <feature>`
    /// command line surface. Returns false if the name is not recognized.
    pub fn enable(&mut self, name: &str) -> bool {
        match name {
            "mutable-globals" => self.import_export_mutable_globals = true,
            "nontrapping-float-to-int" => self.non_trapping_float_to_int = true,
            "sign-extension" => self.sign_extension = true,
            "bulk-memory" => self.bulk_memory_operations = true,
            "simd" => self.simd = true,
            "atomics" => self.atomics = true,
            "exception-handling" => self.exception_handling = true,
            "multivalue" => self.multiple_results_and_block_params = true,
            "reference-types" => self.reference_types = true,
            "extended-name-section" => self.extended_names_section = true,
            "multi-memory" => self.multiple_memories = true,
            "shared-tables" => self.shared_tables = true,
            "legacy-instruction-names" => self.allow_legacy_instruction_names = true,
            "any-extern-kind-elems" => self.allow_any_extern_kind_elem_segments = true,
            "quoted-names" => self.quoted_names_in_text_format = true,
            "wat-custom-sections" => self.custom_sections_in_text_format = true,
            _ => return false,
        }
        true
    }

    /// The feature names accepted by [`FeatureSpec::enable`].
    pub fn feature_names() -> &'static [&'static str] {
        &[
            "mutable-globals",
            "nontrapping-float-to-int",
            "sign-extension",
            "bulk-memory",
            "simd",
            "atomics",
            "exception-handling",
            "multivalue",
            "reference-types",
            "extended-name-section",
            "multi-memory",
            "shared-tables",
            "legacy-instruction-names",
            "any-extern-kind-elems",
            "quoted-names",
            "wat-custom-sections",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mvp_rejects_proposals() {
        let spec = FeatureSpec::mvp();

        assert!(spec.supports(Feature::Mvp));
        assert!(!spec.supports(Feature::Simd));
        assert!(!spec.supports(Feature::ReferenceTypes));
    }

    #[test]
    fn enable_by_name() {
        let mut spec = FeatureSpec::mvp();

        assert!(spec.enable("simd"));
        assert!(spec.supports(Feature::Simd));
        assert!(!spec.enable("time-travel"));
    }

    #[test]
    fn every_feature_name_is_recognized() {
        for name in FeatureSpec::feature_names() {
            let mut spec = FeatureSpec::mvp();
            assert!(spec.enable(name), "unrecognized feature name {name}");
        }
    }
}
