// src/remote/request.rs
use crate::errors::RdecError;

/// CPU architectures the remote service accepts.
///
/// Derived from the host's free-form architecture name by case-insensitive
/// prefix match. The service has no 64-bit x86 support, so "x86_64" is a
/// terminal configuration error rather than a lossy downgrade to `X86`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86,
    Arm,
    PowerPc,
    Mips,
}

impl Architecture {
    pub fn normalize(name: &str) -> Result<Self, RdecError> {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("x86_64") {
            return Err(RdecError::UnsupportedArchitecture(format!(
                "{} (no 64-bit x86 support in the remote service)",
                name
            )));
        }
        if lower.starts_with("arm") {
            Ok(Architecture::Arm)
        } else if lower.starts_with("x86") {
            Ok(Architecture::X86)
        } else if lower.starts_with("powerpc") {
            Ok(Architecture::PowerPc)
        } else if lower.starts_with("mips") {
            Ok(Architecture::Mips)
        } else {
            Err(RdecError::UnsupportedArchitecture(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::Arm => "arm",
            Architecture::PowerPc => "powerpc",
            Architecture::Mips => "mips",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

/// How much of the binary one job covers. All three reduce to the same wire
/// shape; the raw variants additionally need address metadata since no
/// container format carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    WholeFile,
    FunctionRange,
    ByteRange,
}

impl JobMode {
    pub fn is_raw(&self) -> bool {
        !matches!(self, JobMode::WholeFile)
    }

    pub fn wire_str(&self) -> &'static str {
        if self.is_raw() {
            "raw"
        } else {
            "bin"
        }
    }
}

/// Immutable description of one decompilation job. Built once by
/// [`RequestBuilder`] and passed by ownership through the orchestrator.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub mode: JobMode,
    pub architecture: Architecture,
    pub endianness: Endianness,
    pub file_format: String,
    pub input_name: String,
    /// Section VMA / entry-point anchor; `Some` exactly for raw modes.
    pub raw_vma: Option<u64>,
    payload: Vec<u8>,
}

impl JobRequest {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The multipart `data` fields, fixed options included. Addresses go out
    /// as `0x`-prefixed hex, matching what the service expects.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("mode", self.mode.wire_str().to_string()),
            ("architecture", self.architecture.as_str().to_string()),
            ("file_format", self.file_format.clone()),
            ("target_language", "c".to_string()),
            ("raw_endian", self.endianness.as_str().to_string()),
            ("decomp_var_names", "readable".to_string()),
            ("decomp_emit_addresses", "no".to_string()),
            ("generate_cg", "no".to_string()),
            ("generate_cfg", "no".to_string()),
            ("comp_compiler", "gcc".to_string()),
        ];
        if let Some(vma) = self.raw_vma {
            fields.push(("raw_section_vma", format!("{:#x}", vma)));
            fields.push(("raw_entry_point", format!("{:#x}", vma)));
        }
        fields
    }
}

/// Pure mapping from host metadata to [`JobRequest`] values.
///
/// For raw modes the entry point is deliberately set equal to the section
/// start: the remote decompiler requires some entry point for raw payloads
/// and the requested start address is the only anchor available. This can
/// misplace the entry point for code not at a section boundary; kept as-is.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    architecture: Architecture,
    endianness: Endianness,
    file_format: String,
}

impl RequestBuilder {
    pub fn new(
        arch_name: &str,
        endianness: Endianness,
        file_format: impl Into<String>,
    ) -> Result<Self, RdecError> {
        Ok(Self {
            architecture: Architecture::normalize(arch_name)?,
            endianness,
            file_format: file_format.into(),
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn whole_file(
        &self,
        input_name: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<JobRequest, RdecError> {
        if payload.is_empty() {
            return Err(RdecError::Configuration(
                "no data to decompile".to_string(),
            ));
        }
        Ok(JobRequest {
            mode: JobMode::WholeFile,
            architecture: self.architecture,
            endianness: self.endianness,
            file_format: self.file_format.clone(),
            input_name: input_name.into(),
            raw_vma: None,
            payload,
        })
    }

    pub fn byte_range(
        &self,
        input_name: impl Into<String>,
        start: u64,
        payload: Vec<u8>,
    ) -> Result<JobRequest, RdecError> {
        self.raw(JobMode::ByteRange, input_name.into(), start, payload)
    }

    /// Function-range jobs are byte-range jobs over `start..max(block ends)`;
    /// the caller reads those bytes, this only tags the mode.
    pub fn function_range(
        &self,
        input_name: impl Into<String>,
        start: u64,
        payload: Vec<u8>,
    ) -> Result<JobRequest, RdecError> {
        self.raw(JobMode::FunctionRange, input_name.into(), start, payload)
    }

    fn raw(
        &self,
        mode: JobMode,
        input_name: String,
        start: u64,
        payload: Vec<u8>,
    ) -> Result<JobRequest, RdecError> {
        if payload.is_empty() {
            return Err(RdecError::Configuration(
                "no data to decompile".to_string(),
            ));
        }
        Ok(JobRequest {
            mode,
            architecture: self.architecture,
            endianness: self.endianness,
            file_format: self.file_format.clone(),
            input_name,
            raw_vma: Some(start),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn architecture_prefix_normalization() {
        assert_eq!(Architecture::normalize("x86").unwrap(), Architecture::X86);
        assert_eq!(Architecture::normalize("X86").unwrap(), Architecture::X86);
        assert_eq!(Architecture::normalize("armv7").unwrap(), Architecture::Arm);
        // non-prefixed arm names are not recognized
        assert!(Architecture::normalize("aarch32").is_err());
        assert_eq!(
            Architecture::normalize("powerpc_le").unwrap(),
            Architecture::PowerPc
        );
        assert_eq!(
            Architecture::normalize("mipsel32").unwrap(),
            Architecture::Mips
        );
    }

    #[test]
    fn x86_64_is_rejected_outright() {
        let err = Architecture::normalize("x86_64").unwrap_err();
        assert!(matches!(err, RdecError::UnsupportedArchitecture(_)));
    }

    #[test]
    fn unknown_architecture_is_rejected() {
        let err = Architecture::normalize("riscv64").unwrap_err();
        assert!(matches!(err, RdecError::UnsupportedArchitecture(_)));
    }

    #[test]
    fn empty_payload_is_rejected_before_any_network_use() {
        let b = RequestBuilder::new("x86", Endianness::Little, "elf").unwrap();
        assert!(matches!(
            b.byte_range("blob", 0x1000, Vec::new()).unwrap_err(),
            RdecError::Configuration(_)
        ));
        assert!(matches!(
            b.function_range("f", 0x1000, Vec::new()).unwrap_err(),
            RdecError::Configuration(_)
        ));
        assert!(matches!(
            b.whole_file("bin", Vec::new()).unwrap_err(),
            RdecError::Configuration(_)
        ));
    }

    #[test]
    fn raw_request_carries_vma_as_both_section_start_and_entry_point() {
        let b = RequestBuilder::new("armv7", Endianness::Big, "raw").unwrap();
        let req = b.byte_range("blob", 0x401000, vec![0x90]).unwrap();
        assert_eq!(req.mode, JobMode::ByteRange);
        assert!(req.mode.is_raw());
        assert_eq!(req.raw_vma, Some(0x401000));

        let fields = req.form_fields();
        let get = |k: &str| {
            fields
                .iter()
                .find(|(n, _)| *n == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("raw"));
        assert_eq!(get("architecture"), Some("arm"));
        assert_eq!(get("raw_endian"), Some("big"));
        assert_eq!(get("raw_section_vma"), Some("0x401000"));
        assert_eq!(get("raw_entry_point"), Some("0x401000"));
        assert_eq!(get("target_language"), Some("c"));
        assert_eq!(get("decomp_var_names"), Some("readable"));
        assert_eq!(get("comp_compiler"), Some("gcc"));
    }

    #[test]
    fn whole_file_request_has_no_raw_fields() {
        let b = RequestBuilder::new("mips", Endianness::Big, "elf").unwrap();
        let req = b.whole_file("a.out", vec![1, 2, 3]).unwrap();
        assert_eq!(req.mode, JobMode::WholeFile);
        assert_eq!(req.raw_vma, None);
        let fields = req.form_fields();
        assert!(fields.iter().any(|(n, v)| *n == "mode" && v == "bin"));
        assert!(!fields.iter().any(|(n, _)| *n == "raw_section_vma"));
        assert!(!fields.iter().any(|(n, _)| *n == "raw_entry_point"));
    }
}
