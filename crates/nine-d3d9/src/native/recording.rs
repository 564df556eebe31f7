use nine_gpu::hal::{
    BufferDesc, BufferId, GpuBackend, PipelineId, PipelineTag, ResourceRegistry, ShaderModuleId,
    ShaderModuleTag,
};
use nine_gpu::{GpuError, MemoryBackend};

use super::{NativeCommand, NativeDevice, PipelineShaders};
use crate::pipeline::PipelineStateDesc;
use crate::shader::{ShaderId, ShaderStage, TranslatedShader};

/// A pipeline as [`RecordingDevice`] saw it created.
#[derive(Clone, Debug)]
pub struct RecordedPipeline {
    pub desc: PipelineStateDesc,
    pub shaders: [Option<ShaderId>; 3],
    pub modules: [Option<ShaderModuleId>; 3],
}

/// [`NativeDevice`] that keeps everything in memory: buffers live in a [`MemoryBackend`],
/// pipelines and shader modules are recorded, and submitted commands are appended to a log.
///
/// `flush` checks every command queued since the previous flush against the objects alive at
/// that point, the way a real device only resolves them when it encodes the batch.
#[derive(Debug)]
pub struct RecordingDevice {
    backend: MemoryBackend,
    modules: ResourceRegistry<ShaderModuleTag, ShaderStage>,
    pipelines: ResourceRegistry<PipelineTag, RecordedPipeline>,
    pipelines_created: u64,
    commands: Vec<NativeCommand>,
    /// Submitted since the last flush. Unaffected by `take_commands`.
    unflushed: Vec<NativeCommand>,
    flushes: u32,
    fail_pipeline_creation: bool,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            backend: MemoryBackend::new(),
            modules: ResourceRegistry::new("shader module"),
            pipelines: ResourceRegistry::new("pipeline"),
            pipelines_created: 0,
            commands: Vec::new(),
            unflushed: Vec::new(),
            flushes: 0,
            fail_pipeline_creation: false,
        }
    }

    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut MemoryBackend {
        &mut self.backend
    }

    /// Make pipeline creation fail until reset.
    pub fn set_fail_pipeline_creation(&mut self, fail: bool) {
        self.fail_pipeline_creation = fail;
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<&RecordedPipeline> {
        self.pipelines.get(id).ok()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn pipelines_created(&self) -> u64 {
        self.pipelines_created
    }

    pub fn live_shader_modules(&self) -> usize {
        self.modules.len()
    }

    pub fn commands(&self) -> &[NativeCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<NativeCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn flush_count(&self) -> u32 {
        self.flushes
    }

    /// Commands submitted since the last flush.
    pub fn unflushed(&self) -> &[NativeCommand] {
        &self.unflushed
    }

    fn check_buffer(&self, id: BufferId) -> Result<(), GpuError> {
        match self.backend.buffer_data(id) {
            Some(_) => Ok(()),
            None => Err(GpuError::UnknownResource {
                kind: "buffer",
                id: id.raw(),
            }),
        }
    }

    fn check_command(&self, command: &NativeCommand) -> Result<(), GpuError> {
        match command {
            NativeCommand::SetPipeline(id) => self.pipelines.get(*id).map(drop),
            NativeCommand::SetVertexBuffer { buffer, .. }
            | NativeCommand::SetIndexBuffer { buffer, .. }
            | NativeCommand::SetConstantBuffer { buffer, .. } => self.check_buffer(*buffer),
            _ => Ok(()),
        }
    }
}

impl GpuBackend for RecordingDevice {
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferId, GpuError> {
        self.backend.create_buffer(desc)
    }

    fn destroy_buffer(&mut self, id: BufferId) -> Result<(), GpuError> {
        self.backend.destroy_buffer(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        self.backend.write_buffer(buffer, offset, data)
    }
}

impl NativeDevice for RecordingDevice {
    fn create_shader_module(
        &mut self,
        shader: &TranslatedShader,
    ) -> Result<ShaderModuleId, GpuError> {
        Ok(self.modules.insert(shader.stage))
    }

    fn destroy_shader_module(&mut self, id: ShaderModuleId) -> Result<(), GpuError> {
        self.modules.remove(id).map(drop)
    }

    fn create_pipeline(
        &mut self,
        desc: &PipelineStateDesc,
        shaders: &PipelineShaders<'_>,
    ) -> Result<PipelineId, GpuError> {
        if self.fail_pipeline_creation {
            return Err(GpuError::Backend("pipeline creation failed".into()));
        }
        self.pipelines_created += 1;
        Ok(self.pipelines.insert(RecordedPipeline {
            desc: desc.clone(),
            shaders: shaders.ids(),
            modules: [shaders.vs, shaders.ps, shaders.gs].map(|s| s.map(|s| s.module)),
        }))
    }

    fn destroy_pipeline(&mut self, id: PipelineId) -> Result<(), GpuError> {
        self.pipelines.remove(id).map(drop)
    }

    fn submit_commands(&mut self, commands: &[NativeCommand]) -> Result<(), GpuError> {
        for command in commands {
            if let NativeCommand::SetPipeline(id) = command {
                self.pipelines.get(*id)?;
            }
        }
        self.commands.extend_from_slice(commands);
        self.unflushed.extend_from_slice(commands);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), GpuError> {
        // The batch is gone either way, as with a failed encode.
        let batch = std::mem::take(&mut self.unflushed);
        for command in &batch {
            self.check_command(command)?;
        }
        self.flushes += 1;
        Ok(())
    }
}
