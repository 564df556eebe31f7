//! Shader objects and the seam to the bytecode translation service.
//!
//! Translation itself (legacy token stream to WGSL) lives outside this crate; the device only
//! needs the translated code and the resource footprint the translator reports.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

use nine_gpu::hal::ShaderModuleId;
use thiserror::Error;

use crate::constants::ConstantType;
use crate::vertex::DeclUsage;

/// Largest bytecode blob accepted from the runtime.
pub const MAX_SHADER_BLOB_BYTES: usize = 512 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Geometry,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Pixel => "pixel",
            ShaderStage::Geometry => "geometry",
        })
    }
}

/// Identity of a shader object. Pipeline keys compare shaders by identity, never by content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(NonZeroU64);

impl ShaderId {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

/// Highest constant register (exclusive) read by a translated shader, per register file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ConstantUsage {
    pub float_registers: u32,
    pub int_registers: u32,
    pub bool_registers: u32,
}

impl ConstantUsage {
    pub fn registers(&self, ty: ConstantType) -> u32 {
        match ty {
            ConstantType::Float => self.float_registers,
            ConstantType::Int => self.int_registers,
            ConstantType::Bool => self.bool_registers,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SemanticDecl {
    pub usage: DeclUsage,
    pub usage_index: u8,
    pub location: u32,
}

/// Value record returned by the translation service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslatedShader {
    pub stage: ShaderStage,
    pub wgsl: String,
    pub entry_point: String,
    pub constants: ConstantUsage,
    pub inputs: Vec<SemanticDecl>,
    pub outputs: Vec<SemanticDecl>,
    /// Bit `n` set when sampler `s#n` is referenced.
    pub used_samplers: u16,
}

#[derive(Debug, Error)]
pub enum ShaderTranslateError {
    #[error("malformed shader bytecode: {0}")]
    Malformed(String),
    #[error("unsupported shader feature: {0}")]
    Unsupported(String),
    #[error("shader translation failed: {0}")]
    Translation(String),
}

/// Fixed-function state that selects a generated shader variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixedFunctionKey {
    pub stage: ShaderStage,
    pub layout_hash: u64,
    pub pretransformed: bool,
    pub point_size: bool,
    pub texture_stages: u8,
}

/// The bytecode translation service.
pub trait ShaderTranslator {
    fn translate(
        &self,
        stage: ShaderStage,
        bytecode: &[u8],
    ) -> Result<TranslatedShader, ShaderTranslateError>;

    /// Generate a shader emulating the fixed-function pipeline for `key`.
    fn fixed_function(&self, key: &FixedFunctionKey) -> Result<TranslatedShader, ShaderTranslateError>;
}

/// What a stage needs to know about its bound shader.
#[derive(Clone, Debug)]
pub struct ShaderBinding {
    pub id: ShaderId,
    pub module: ShaderModuleId,
    pub translated: Arc<TranslatedShader>,
}

impl PartialEq for ShaderBinding {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ShaderBinding {}

impl ShaderBinding {
    pub fn constants(&self) -> ConstantUsage {
        self.translated.constants
    }
}

/// A created shader object, owned by the device.
#[derive(Debug)]
pub struct Shader {
    pub binding: ShaderBinding,
    pub content_hash: blake3::Hash,
    /// Generated for fixed-function emulation rather than created by the application.
    pub fixed_function: bool,
}

impl Shader {
    pub fn id(&self) -> ShaderId {
        self.binding.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.binding.translated.stage
    }
}

pub(crate) fn validate_blob(bytecode: &[u8]) -> Result<(), ShaderTranslateError> {
    if bytecode.is_empty() || bytecode.len() % 4 != 0 {
        return Err(ShaderTranslateError::Malformed(format!(
            "shader blob length {} is not a non-empty multiple of 4",
            bytecode.len()
        )));
    }
    if bytecode.len() > MAX_SHADER_BLOB_BYTES {
        return Err(ShaderTranslateError::Malformed(format!(
            "shader blob length {} exceeds maximum {MAX_SHADER_BLOB_BYTES} bytes",
            bytecode.len()
        )));
    }
    Ok(())
}
