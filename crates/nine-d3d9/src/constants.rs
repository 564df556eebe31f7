//! Shader constant registers and their versioned upload into constant buffers.
//!
//! Each stage has one buffer per register file. A buffer is copied into the upload ring only
//! when it changed, or when the bound shader reads further into it than the last copy covered.

use nine_gpu::hal::{BufferDesc, BufferId, BufferUsages, GpuBackend};
use nine_gpu::{FastUploadAllocator, UploadAllocation};
use tracing::trace;

use crate::error::DdiError;
use crate::native::NativeCommand;
use crate::shader::{ConstantUsage, ShaderStage};

pub const MAX_VS_FLOAT_CONSTANTS: u32 = 256;
pub const MAX_PS_FLOAT_CONSTANTS: u32 = 224;
pub const MAX_INT_CONSTANTS: u32 = 16;
pub const MAX_BOOL_CONSTANTS: u32 = 16;

/// Constant-buffer slot carrying the stage's fixed-function extension block.
pub const EXTENSION_SLOT: u32 = 3;

/// Size of the zero-filled buffer bound to slots nothing was ever uploaded for.
pub const NULL_BINDING_SIZE: u64 = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstantType {
    Float,
    Int,
    Bool,
}

impl ConstantType {
    pub const ALL: [ConstantType; 3] = [ConstantType::Float, ConstantType::Int, ConstantType::Bool];

    /// Bytes per register: `float4`, `int4` or a single `BOOL`.
    pub fn element_size(self) -> u64 {
        match self {
            ConstantType::Float | ConstantType::Int => 16,
            ConstantType::Bool => 4,
        }
    }

    pub fn slot(self) -> u32 {
        match self {
            ConstantType::Float => 0,
            ConstantType::Int => 1,
            ConstantType::Bool => 2,
        }
    }

    pub fn max_registers(self, stage: ShaderStage) -> u32 {
        match (self, stage) {
            (ConstantType::Float, ShaderStage::Pixel) => MAX_PS_FLOAT_CONSTANTS,
            (ConstantType::Float, _) => MAX_VS_FLOAT_CONSTANTS,
            (ConstantType::Int, _) => MAX_INT_CONSTANTS,
            (ConstantType::Bool, _) => MAX_BOOL_CONSTANTS,
        }
    }
}

/// CPU copy of one register file plus the bookkeeping for its GPU version.
#[derive(Debug)]
pub struct ConstantBufferData {
    ty: ConstantType,
    data: Vec<u8>,
    dirty: bool,
    /// Bytes covered by the current GPU version.
    committed_size: u64,
    version: Option<UploadAllocation>,
    /// Upload ring generation `version` was written in. A newer ring may have destroyed it.
    generation: u64,
}

impl ConstantBufferData {
    pub fn new(ty: ConstantType, registers: u32) -> Self {
        Self {
            ty,
            data: vec![0; (u64::from(registers) * ty.element_size()) as usize],
            dirty: true,
            committed_size: 0,
            version: None,
            generation: 0,
        }
    }

    pub fn ty(&self) -> ConstantType {
        self.ty
    }

    pub fn capacity(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn committed_size(&self) -> u64 {
        self.committed_size
    }

    /// Write whole registers starting at `start_register`. Rejected without touching the buffer
    /// when the range does not fit.
    pub fn set_data(&mut self, start_register: u32, bytes: &[u8]) -> Result<(), DdiError> {
        let element = self.ty.element_size();
        if bytes.len() as u64 % element != 0 {
            return Err(DdiError::invalid(format!(
                "{} bytes is not a whole number of {:?} registers",
                bytes.len(),
                self.ty
            )));
        }
        let start = u64::from(start_register) * element;
        let end = start + bytes.len() as u64;
        if end > self.capacity() {
            return Err(DdiError::invalid(format!(
                "{:?} constants {start_register}..{} exceed {} registers",
                self.ty,
                end / element,
                self.capacity() / element
            )));
        }
        self.data[start as usize..end as usize].copy_from_slice(bytes);
        self.dirty = true;
        Ok(())
    }

    /// Copy the first `min(requested, capacity)` bytes into the upload ring if the buffer changed,
    /// the active size grew, or the ring was reallocated since the last copy. Returns the new
    /// version, or `None` when the current one still serves.
    pub fn update_app_visible<B: GpuBackend + ?Sized>(
        &mut self,
        uploads: &mut FastUploadAllocator,
        backend: &mut B,
        requested: u64,
    ) -> Result<Option<UploadAllocation>, DdiError> {
        let size = requested.min(self.capacity());
        if !self.dirty
            && size <= self.committed_size
            && self.version.is_some()
            && self.generation == uploads.generation()
        {
            return Ok(None);
        }
        if size == 0 {
            return Ok(None);
        }
        let allocation = uploads.allocate_and_write(backend, &self.data[..size as usize])?;
        self.version = Some(allocation);
        self.generation = uploads.generation();
        self.committed_size = size;
        self.dirty = false;
        Ok(Some(allocation))
    }

    /// Drop the GPU version so the next update uploads again.
    pub fn invalidate(&mut self) {
        self.version = None;
        self.committed_size = 0;
        self.dirty = true;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SlotBinding {
    buffer: BufferId,
    offset: u64,
    size: u64,
}

#[derive(Debug)]
struct StageConstants {
    stage: ShaderStage,
    buffers: [ConstantBufferData; 3],
    bound: [Option<SlotBinding>; 3],
    /// Upload ring generation the `bound` windows were taken from.
    bound_generation: u64,
}

impl StageConstants {
    fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            buffers: ConstantType::ALL.map(|ty| ConstantBufferData::new(ty, ty.max_registers(stage))),
            bound: [None; 3],
            bound_generation: 0,
        }
    }

    fn buffer_mut(&mut self, ty: ConstantType) -> &mut ConstantBufferData {
        &mut self.buffers[ty.slot() as usize]
    }
}

/// Constant registers of the vertex and pixel stage.
#[derive(Debug)]
pub struct ConstantsManager {
    vertex: StageConstants,
    pixel: StageConstants,
    null_buffer: Option<BufferId>,
}

impl Default for ConstantsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantsManager {
    pub fn new() -> Self {
        Self {
            vertex: StageConstants::new(ShaderStage::Vertex),
            pixel: StageConstants::new(ShaderStage::Pixel),
            null_buffer: None,
        }
    }

    fn stage(&self, stage: ShaderStage) -> Result<&StageConstants, DdiError> {
        match stage {
            ShaderStage::Vertex => Ok(&self.vertex),
            ShaderStage::Pixel => Ok(&self.pixel),
            ShaderStage::Geometry => Err(DdiError::NotImplemented("geometry shader constants")),
        }
    }

    fn stage_mut(&mut self, stage: ShaderStage) -> Result<&mut StageConstants, DdiError> {
        match stage {
            ShaderStage::Vertex => Ok(&mut self.vertex),
            ShaderStage::Pixel => Ok(&mut self.pixel),
            ShaderStage::Geometry => Err(DdiError::NotImplemented("geometry shader constants")),
        }
    }

    pub fn buffer(&self, stage: ShaderStage, ty: ConstantType) -> Result<&ConstantBufferData, DdiError> {
        Ok(&self.stage(stage)?.buffers[ty.slot() as usize])
    }

    pub fn set_data(
        &mut self,
        stage: ShaderStage,
        ty: ConstantType,
        start_register: u32,
        bytes: &[u8],
    ) -> Result<(), DdiError> {
        self.stage_mut(stage)?
            .buffer_mut(ty)
            .set_data(start_register, bytes)
    }

    pub fn set_floats(
        &mut self,
        stage: ShaderStage,
        start_register: u32,
        values: &[[f32; 4]],
    ) -> Result<(), DdiError> {
        self.set_data(stage, ConstantType::Float, start_register, bytemuck::cast_slice(values))
    }

    pub fn set_ints(
        &mut self,
        stage: ShaderStage,
        start_register: u32,
        values: &[[i32; 4]],
    ) -> Result<(), DdiError> {
        self.set_data(stage, ConstantType::Int, start_register, bytemuck::cast_slice(values))
    }

    /// Any non-zero `BOOL` is stored as 1.
    pub fn set_bools(
        &mut self,
        stage: ShaderStage,
        start_register: u32,
        values: &[u32],
    ) -> Result<(), DdiError> {
        let normalized: Vec<u32> = values.iter().map(|&v| u32::from(v != 0)).collect();
        self.set_data(stage, ConstantType::Bool, start_register, bytemuck::cast_slice(&normalized))
    }

    /// The zero-filled buffer bound to slots nothing was ever uploaded for.
    pub fn null_binding<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> Result<BufferId, DdiError> {
        if let Some(buffer) = self.null_buffer {
            return Ok(buffer);
        }
        let buffer = backend.create_buffer(BufferDesc {
            label: Some("nine null constants".into()),
            size: NULL_BINDING_SIZE,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        })?;
        backend.write_buffer(buffer, 0, &[0u8; NULL_BINDING_SIZE as usize])?;
        self.null_buffer = Some(buffer);
        Ok(buffer)
    }

    /// Version what the stage's shader reads and append the binds that changed to `commands`.
    /// The extension block is uploaded and rebound on every call.
    pub fn update_app_visible_and_bind_to_pipeline<B: GpuBackend + ?Sized>(
        &mut self,
        stage: ShaderStage,
        usage: ConstantUsage,
        extension: &[u8],
        uploads: &mut FastUploadAllocator,
        backend: &mut B,
        commands: &mut Vec<NativeCommand>,
    ) -> Result<(), DdiError> {
        let null = self.null_binding(backend)?;
        let constants = self.stage_mut(stage)?;
        // Nothing is emitted until every upload for the stage succeeded.
        let mut binds = Vec::with_capacity(4);
        let mut bound = constants.bound;
        if constants.bound_generation != uploads.generation() {
            bound = [None; 3];
        }
        for ty in ConstantType::ALL {
            let slot = ty.slot();
            let requested = u64::from(usage.registers(ty)) * ty.element_size();
            let buffer = constants.buffer_mut(ty);
            let binding = if requested == 0 {
                SlotBinding {
                    buffer: null,
                    offset: 0,
                    size: NULL_BINDING_SIZE,
                }
            } else {
                match buffer.update_app_visible(uploads, backend, requested)? {
                    Some(a) => SlotBinding {
                        buffer: a.buffer,
                        offset: a.offset,
                        size: requested.min(buffer.capacity()),
                    },
                    None => match bound[slot as usize] {
                        Some(current) => current,
                        None => return Err(DdiError::InvariantViolation("constant buffer version missing")),
                    },
                }
            };
            if bound[slot as usize] != Some(binding) {
                bound[slot as usize] = Some(binding);
                binds.push(NativeCommand::SetConstantBuffer {
                    stage: constants.stage,
                    slot,
                    buffer: binding.buffer,
                    offset: binding.offset,
                    size: binding.size,
                });
            }
        }

        if !extension.is_empty() {
            let ext = uploads.allocate_and_write(backend, extension)?;
            binds.push(NativeCommand::SetConstantBuffer {
                stage: constants.stage,
                slot: EXTENSION_SLOT,
                buffer: ext.buffer,
                offset: ext.offset,
                size: extension.len() as u64,
            });
        }

        constants.bound = bound;
        constants.bound_generation = uploads.generation();
        trace!(%stage, binds = binds.len(), "constants bound");
        commands.extend(binds);
        Ok(())
    }

    /// Forget every GPU version, e.g. once retired upload buffers have been destroyed.
    pub fn invalidate(&mut self) {
        for constants in [&mut self.vertex, &mut self.pixel] {
            constants.buffers.iter_mut().for_each(ConstantBufferData::invalidate);
            constants.bound = [None; 3];
        }
    }

    pub fn destroy<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), DdiError> {
        self.invalidate();
        if let Some(buffer) = self.null_buffer.take() {
            backend.destroy_buffer(buffer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nine_gpu::{MemoryBackend, UploadAllocatorDesc};

    fn ring() -> FastUploadAllocator {
        FastUploadAllocator::new(UploadAllocatorDesc {
            initial_size: 64 * 1024,
            alignment: 256,
            ..Default::default()
        })
        .unwrap()
    }

    fn usage(floats: u32) -> ConstantUsage {
        ConstantUsage {
            float_registers: floats,
            ..Default::default()
        }
    }

    fn constant_binds(commands: &[NativeCommand]) -> Vec<(u32, u64)> {
        commands
            .iter()
            .filter_map(|c| match c {
                NativeCommand::SetConstantBuffer { slot, size, .. } => Some((*slot, *size)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn set_data_rejects_out_of_range_without_mutation() {
        let mut buf = ConstantBufferData::new(ConstantType::Float, 4);
        buf.set_data(3, &[1u8; 16]).unwrap();
        let before = buf.data().to_vec();

        let err = buf.set_data(3, &[2u8; 32]).unwrap_err();
        assert!(matches!(err, DdiError::InvalidArgument(_)));
        assert_eq!(buf.data(), &before[..]);
        assert!(buf.set_data(0, &[0u8; 12]).is_err());
        assert!(buf.set_data(u32::MAX, &[0u8; 16]).is_err());
    }

    #[test]
    fn versions_exactly_the_active_size_and_skips_when_clean() {
        let mut backend = MemoryBackend::new();
        let mut uploads = ring();
        let mut buf = ConstantBufferData::new(ConstantType::Float, 8);
        buf.set_data(0, bytemuck::cast_slice(&[[1.0f32; 4]; 8])).unwrap();

        let first = buf
            .update_app_visible(&mut uploads, &mut backend, 32)
            .unwrap()
            .unwrap();
        let data = backend.buffer_data(first.buffer).unwrap();
        let floats: Vec<f32> = data[first.offset as usize..][..32]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(floats, vec![1.0; 8]);
        // The rest of the allocation is untouched.
        assert_eq!(&data[first.offset as usize + 32..][..16], &[0u8; 16]);

        assert_eq!(buf.update_app_visible(&mut uploads, &mut backend, 32).unwrap(), None);
        assert_eq!(buf.update_app_visible(&mut uploads, &mut backend, 16).unwrap(), None);

        // Growing the active size forces a new version.
        assert!(buf
            .update_app_visible(&mut uploads, &mut backend, 64)
            .unwrap()
            .is_some());
        // Requests past the end are clamped to the buffer.
        buf.set_data(7, &[0u8; 16]).unwrap();
        assert!(buf
            .update_app_visible(&mut uploads, &mut backend, 4096)
            .unwrap()
            .is_some());
        assert_eq!(buf.committed_size(), 128);
    }

    #[test]
    fn ring_reallocation_forces_a_new_version() {
        let mut backend = MemoryBackend::new();
        let mut uploads = FastUploadAllocator::new(UploadAllocatorDesc {
            initial_size: 256,
            alignment: 256,
            deferred_destroy: false,
            ..Default::default()
        })
        .unwrap();
        let mut constants = ConstantsManager::new();
        constants.set_floats(ShaderStage::Vertex, 0, &[[1.0; 4]]).unwrap();

        let bind = |constants: &mut ConstantsManager,
                    uploads: &mut FastUploadAllocator,
                    backend: &mut MemoryBackend| {
            let mut commands = Vec::new();
            constants
                .update_app_visible_and_bind_to_pipeline(
                    ShaderStage::Vertex,
                    usage(1),
                    &[],
                    uploads,
                    backend,
                    &mut commands,
                )
                .unwrap();
            commands
                .into_iter()
                .find_map(|c| match c {
                    NativeCommand::SetConstantBuffer { slot: 0, buffer, .. } => Some(buffer),
                    _ => None,
                })
        };

        let first = bind(&mut constants, &mut uploads, &mut backend).unwrap();
        assert_eq!(bind(&mut constants, &mut uploads, &mut backend), None);

        // Growing the ring destroys the buffer the unchanged registers were copied into.
        uploads.allocate(&mut backend, 4096).unwrap();
        assert!(backend.buffer_data(first).is_none());

        let second = bind(&mut constants, &mut uploads, &mut backend).unwrap();
        assert_ne!(second, first);
        assert!(backend.buffer_data(second).is_some());
    }

    #[test]
    fn unused_slots_get_the_null_binding() {
        let mut backend = MemoryBackend::new();
        let mut uploads = ring();
        let mut constants = ConstantsManager::new();
        let mut commands = Vec::new();
        constants
            .update_app_visible_and_bind_to_pipeline(
                ShaderStage::Vertex,
                usage(0),
                &[],
                &mut uploads,
                &mut backend,
                &mut commands,
            )
            .unwrap();

        let null = constants.null_binding(&mut backend).unwrap();
        assert_eq!(commands.len(), 3);
        for command in &commands {
            let NativeCommand::SetConstantBuffer { buffer, .. } = command else {
                panic!("unexpected command {command:?}");
            };
            assert_eq!(*buffer, null);
        }
        assert!(backend.buffer_data(null).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn rebinds_only_what_changed_and_always_the_extension() {
        let mut backend = MemoryBackend::new();
        let mut uploads = ring();
        let mut constants = ConstantsManager::new();
        constants
            .set_floats(ShaderStage::Pixel, 0, &[[0.5; 4]; 2])
            .unwrap();

        let mut commands = Vec::new();
        let ext = [0u8; 48];
        for _ in 0..2 {
            constants
                .update_app_visible_and_bind_to_pipeline(
                    ShaderStage::Pixel,
                    usage(2),
                    &ext,
                    &mut uploads,
                    &mut backend,
                    &mut commands,
                )
                .unwrap();
        }
        assert_eq!(
            constant_binds(&commands),
            vec![(0, 32), (1, NULL_BINDING_SIZE), (2, NULL_BINDING_SIZE), (3, 48), (3, 48)]
        );

        commands.clear();
        constants.set_floats(ShaderStage::Pixel, 1, &[[2.0; 4]]).unwrap();
        constants
            .update_app_visible_and_bind_to_pipeline(
                ShaderStage::Pixel,
                usage(2),
                &ext,
                &mut uploads,
                &mut backend,
                &mut commands,
            )
            .unwrap();
        assert_eq!(constant_binds(&commands), vec![(0, 32), (3, 48)]);
    }

    #[test]
    fn bools_are_normalized_and_ranges_checked_per_stage() {
        let mut constants = ConstantsManager::new();
        constants.set_bools(ShaderStage::Vertex, 14, &[7, 0]).unwrap();
        let data = constants
            .buffer(ShaderStage::Vertex, ConstantType::Bool)
            .unwrap()
            .data();
        let bools: Vec<u32> = data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(&bools[14..], &[1, 0]);

        assert!(constants.set_bools(ShaderStage::Vertex, 15, &[1, 1]).is_err());
        assert!(constants
            .set_floats(ShaderStage::Vertex, 255, &[[0.0; 4]])
            .is_ok());
        assert!(constants
            .set_floats(ShaderStage::Pixel, 224, &[[0.0; 4]])
            .is_err());
        assert!(matches!(
            constants.set_floats(ShaderStage::Geometry, 0, &[[0.0; 4]]),
            Err(DdiError::NotImplemented(_))
        ));
    }
}
