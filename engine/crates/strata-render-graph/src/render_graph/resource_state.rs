//! 资源状态定义
//!
//! `DeviceResourceState` 是与后端无关的访问状态集合，
//! 同一个资源在同一层里被多个 Pass 以不同方式读取时，状态按位合并。
//!
//! 提供到 Vulkan 的 pipeline stage、access mask 和 image layout 的映射，
//! 后端在把 barrier 翻译成真正的同步指令时使用。

use ash::vk;

bitflags::bitflags! {
    /// 设备资源的访问状态
    ///
    /// 空集合即 `UNDEFINED`：内容未定义，任何访问之前都需要一次转换。
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DeviceResourceState: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SHADER_SAMPLED = 1 << 2;
        const COLOR_TARGET = 1 << 3;
        const COLOR_MULTISAMPLE_RESOLVE = 1 << 4;
        const DEPTH_STENCIL_TARGET = 1 << 5;
        const DEPTH_STENCIL_READ = 1 << 6;
        const STORAGE_TEXTURE_READ = 1 << 7;
        const STORAGE_TEXTURE_WRITE = 1 << 8;
        const PRESENT_TEXTURE = 1 << 9;

        const VERTEX_BUFFER = 1 << 10;
        const INDEX_BUFFER = 1 << 11;
        const INDIRECT_ARGUMENT = 1 << 12;
        const UNIFORM_BUFFER = 1 << 13;
        const STORAGE_BUFFER_READ = 1 << 14;
        const STORAGE_BUFFER_WRITE = 1 << 15;
    }
}

// 状态分类
impl DeviceResourceState {
    pub const UNDEFINED: Self = Self::empty();

    /// 会修改资源内容的状态
    pub const WRITE_STATES: Self = Self::TRANSFER_DST
        .union(Self::COLOR_TARGET)
        .union(Self::COLOR_MULTISAMPLE_RESOLVE)
        .union(Self::DEPTH_STENCIL_TARGET)
        .union(Self::STORAGE_TEXTURE_WRITE)
        .union(Self::STORAGE_BUFFER_WRITE);

    /// 只对 texture 有意义的状态
    pub const TEXTURE_STATES: Self = Self::SHADER_SAMPLED
        .union(Self::COLOR_TARGET)
        .union(Self::COLOR_MULTISAMPLE_RESOLVE)
        .union(Self::DEPTH_STENCIL_TARGET)
        .union(Self::DEPTH_STENCIL_READ)
        .union(Self::STORAGE_TEXTURE_READ)
        .union(Self::STORAGE_TEXTURE_WRITE)
        .union(Self::PRESENT_TEXTURE);

    /// 只对 buffer 有意义的状态
    pub const BUFFER_STATES: Self = Self::VERTEX_BUFFER
        .union(Self::INDEX_BUFFER)
        .union(Self::INDIRECT_ARGUMENT)
        .union(Self::UNIFORM_BUFFER)
        .union(Self::STORAGE_BUFFER_READ)
        .union(Self::STORAGE_BUFFER_WRITE);

    #[inline]
    pub fn is_undefined(self) -> bool {
        self.is_empty()
    }

    #[inline]
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_STATES)
    }

    /// 非空且不包含任何写状态
    #[inline]
    pub fn is_read_only(self) -> bool {
        !self.is_empty() && !self.is_write()
    }

    #[inline]
    pub fn is_texture_compatible(self) -> bool {
        !self.intersects(Self::BUFFER_STATES)
    }

    #[inline]
    pub fn is_buffer_compatible(self) -> bool {
        !self.intersects(Self::TEXTURE_STATES)
    }
}

const SHADER_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags2::COMPUTE_SHADER.as_raw(),
);

const FRAGMENT_TESTS: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw() | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

/// 每个单独状态对应的 stage 和 access
const VK_STATE_TABLE: [(DeviceResourceState, vk::PipelineStageFlags2, vk::AccessFlags2); 16] = [
    (DeviceResourceState::TRANSFER_SRC, vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
    (DeviceResourceState::TRANSFER_DST, vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
    (DeviceResourceState::SHADER_SAMPLED, SHADER_STAGES, vk::AccessFlags2::SHADER_SAMPLED_READ),
    (
        DeviceResourceState::COLOR_TARGET,
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw() | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
    ),
    (
        DeviceResourceState::COLOR_MULTISAMPLE_RESOLVE,
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
    ),
    (
        DeviceResourceState::DEPTH_STENCIL_TARGET,
        FRAGMENT_TESTS,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
    ),
    (DeviceResourceState::DEPTH_STENCIL_READ, FRAGMENT_TESTS, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ),
    (DeviceResourceState::STORAGE_TEXTURE_READ, SHADER_STAGES, vk::AccessFlags2::SHADER_STORAGE_READ),
    (DeviceResourceState::STORAGE_TEXTURE_WRITE, SHADER_STAGES, vk::AccessFlags2::SHADER_STORAGE_WRITE),
    (DeviceResourceState::PRESENT_TEXTURE, vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE),
    (
        DeviceResourceState::VERTEX_BUFFER,
        vk::PipelineStageFlags2::VERTEX_INPUT,
        vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
    ),
    (DeviceResourceState::INDEX_BUFFER, vk::PipelineStageFlags2::VERTEX_INPUT, vk::AccessFlags2::INDEX_READ),
    (
        DeviceResourceState::INDIRECT_ARGUMENT,
        vk::PipelineStageFlags2::DRAW_INDIRECT,
        vk::AccessFlags2::INDIRECT_COMMAND_READ,
    ),
    (DeviceResourceState::UNIFORM_BUFFER, SHADER_STAGES, vk::AccessFlags2::UNIFORM_READ),
    (DeviceResourceState::STORAGE_BUFFER_READ, SHADER_STAGES, vk::AccessFlags2::SHADER_STORAGE_READ),
    (DeviceResourceState::STORAGE_BUFFER_WRITE, SHADER_STAGES, vk::AccessFlags2::SHADER_STORAGE_WRITE),
];

// Vulkan 映射
impl DeviceResourceState {
    pub fn vk_stage(self) -> vk::PipelineStageFlags2 {
        if self.is_empty() {
            return vk::PipelineStageFlags2::TOP_OF_PIPE;
        }
        VK_STATE_TABLE
            .iter()
            .filter(|(state, _, _)| self.contains(*state))
            .fold(vk::PipelineStageFlags2::NONE, |acc, (_, stage, _)| acc | *stage)
    }

    pub fn vk_access(self) -> vk::AccessFlags2 {
        VK_STATE_TABLE
            .iter()
            .filter(|(state, _, _)| self.contains(*state))
            .fold(vk::AccessFlags2::NONE, |acc, (_, _, access)| acc | *access)
    }

    /// 多个状态组合时，只有深度只读 + 采样能保留专用 layout，其余退化为 GENERAL
    pub fn vk_image_layout(self) -> vk::ImageLayout {
        if self.is_empty() {
            vk::ImageLayout::UNDEFINED
        } else if self == Self::TRANSFER_SRC {
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        } else if self == Self::TRANSFER_DST {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        } else if self == Self::SHADER_SAMPLED {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        } else if self == Self::COLOR_TARGET || self == Self::COLOR_MULTISAMPLE_RESOLVE {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else if self == Self::DEPTH_STENCIL_TARGET {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else if self == Self::DEPTH_STENCIL_READ || self == Self::DEPTH_STENCIL_READ | Self::SHADER_SAMPLED {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        } else if self == Self::PRESENT_TEXTURE {
            vk::ImageLayout::PRESENT_SRC_KHR
        } else {
            vk::ImageLayout::GENERAL
        }
    }
}
