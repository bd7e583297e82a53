//! 资源声明
//!
//! Graph 中的资源只有两种来源：外部导入，或者由某个 Pass 声明的 transient 资源。
//! Transient 资源只保存描述信息，物理资源在编译时按需分配。

use std::fmt;

use ash::vk;

use super::resource_handle::{PhysicalResourceId, RgResourceHandle};
use super::resource_state::DeviceResourceState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceKind {
    Texture,
    Buffer,
}

impl RgResourceKind {
    /// 该类资源是否可以处于 `state`
    #[inline]
    pub fn accepts(self, state: DeviceResourceState) -> bool {
        match self {
            Self::Texture => state.is_texture_compatible(),
            Self::Buffer => state.is_buffer_compatible(),
        }
    }
}

impl fmt::Display for RgResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Texture => f.write_str("texture"),
            Self::Buffer => f.write_str("buffer"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgExtent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl RgExtent {
    #[inline]
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self { width, height, depth: 1 }
    }

    #[inline]
    pub fn is_zero_sized(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }

    /// 完整 mip 链的长度
    pub fn max_mip_levels(&self) -> u32 {
        let largest = self.width.max(self.height).max(self.depth);
        if largest == 0 { 0 } else { u32::BITS - largest.leading_zeros() }
    }
}

/// Transient 纹理描述
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgTextureDesc {
    pub extent: RgExtent,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub array_layers: u32,
    /// 采样数，必须是 2 的幂
    pub samples: u32,
    /// 这个纹理会进入的所有状态
    pub usage: DeviceResourceState,
}

impl Default for RgTextureDesc {
    fn default() -> Self {
        Self {
            extent: RgExtent::new_2d(1, 1),
            format: vk::Format::R8G8B8A8_UNORM,
            mip_levels: 1,
            array_layers: 1,
            samples: 1,
            usage: DeviceResourceState::SHADER_SAMPLED,
        }
    }
}

// new & builder
impl RgTextureDesc {
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: vk::Format, usage: DeviceResourceState) -> Self {
        Self {
            extent: RgExtent::new_2d(width, height),
            format,
            usage,
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.extent.depth = depth;
        self
    }

    #[inline]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    #[inline]
    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    #[inline]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    /// 检查描述是否可以创建出真实的纹理，返回不合法的原因
    pub fn validate(&self) -> Result<(), String> {
        if self.extent.is_zero_sized() {
            return Err(format!(
                "zero extent {}x{}x{}",
                self.extent.width, self.extent.height, self.extent.depth
            ));
        }
        if self.format == vk::Format::UNDEFINED {
            return Err("undefined format".to_string());
        }
        if self.array_layers == 0 {
            return Err("zero array layers".to_string());
        }
        if self.mip_levels == 0 || self.mip_levels > self.extent.max_mip_levels() {
            return Err(format!(
                "mip levels {} out of range 1..={}",
                self.mip_levels,
                self.extent.max_mip_levels()
            ));
        }
        if !self.samples.is_power_of_two() || self.samples > 64 {
            return Err(format!("invalid sample count {}", self.samples));
        }
        if self.samples > 1 && self.mip_levels > 1 {
            return Err("multisampled texture cannot have mip levels".to_string());
        }
        if !self.usage.is_texture_compatible() {
            return Err(format!("buffer usage {:?} on texture", self.usage & DeviceResourceState::BUFFER_STATES));
        }
        Ok(())
    }
}

/// Transient 纹理中跟随另一个导入纹理的字段
///
/// 比如和 swapchain 一样大的 G-Buffer：外部纹理重新导入、尺寸变化之后，
/// 依赖它的 transient 纹理在下一次编译时用新的值重新分配。
/// 没有设置依赖的字段使用 [`RgTextureDesc`] 中的值。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RgTextureDependency {
    pub extent: Option<RgResourceHandle>,
    pub format: Option<RgResourceHandle>,
    pub mip_levels: Option<RgResourceHandle>,
    pub samples: Option<RgResourceHandle>,
}

impl RgTextureDependency {
    /// 尺寸跟随 `source`
    #[inline]
    pub fn extent_of(source: RgResourceHandle) -> Self {
        Self {
            extent: Some(source),
            ..Default::default()
        }
    }

    /// 尺寸和格式都跟随 `source`
    #[inline]
    pub fn extent_and_format_of(source: RgResourceHandle) -> Self {
        Self {
            extent: Some(source),
            format: Some(source),
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_mip_levels_of(mut self, source: RgResourceHandle) -> Self {
        self.mip_levels = Some(source);
        self
    }

    #[inline]
    pub fn with_samples_of(mut self, source: RgResourceHandle) -> Self {
        self.samples = Some(source);
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources().next().is_none()
    }

    pub fn sources(&self) -> impl Iterator<Item = RgResourceHandle> {
        [self.extent, self.format, self.mip_levels, self.samples].into_iter().flatten()
    }

    #[inline]
    pub fn depends_on(&self, handle: RgResourceHandle) -> bool {
        self.sources().any(|h| h == handle)
    }

    /// 用依赖纹理的描述覆盖对应字段
    ///
    /// `lookup` 找不到某个依赖时返回该依赖的句柄。
    pub fn resolve(
        &self,
        mut desc: RgTextureDesc,
        lookup: impl Fn(RgResourceHandle) -> Option<RgTextureDesc>,
    ) -> Result<RgTextureDesc, RgResourceHandle> {
        let source = |handle: RgResourceHandle| lookup(handle).ok_or(handle);
        if let Some(handle) = self.extent {
            desc.extent = source(handle)?.extent;
        }
        if let Some(handle) = self.format {
            desc.format = source(handle)?.format;
        }
        if let Some(handle) = self.mip_levels {
            desc.mip_levels = source(handle)?.mip_levels;
        }
        if let Some(handle) = self.samples {
            desc.samples = source(handle)?.samples;
        }
        Ok(desc)
    }
}

/// Transient buffer 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgBufferDesc {
    pub size: u64,
    pub usage: DeviceResourceState,
}

impl RgBufferDesc {
    #[inline]
    pub fn new(size: u64, usage: DeviceResourceState) -> Self {
        Self { size, usage }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.size == 0 {
            return Err("zero size".to_string());
        }
        if !self.usage.is_buffer_compatible() {
            return Err(format!("texture usage {:?} on buffer", self.usage & DeviceResourceState::TEXTURE_STATES));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgTransientDesc {
    Texture(RgTextureDesc),
    Buffer(RgBufferDesc),
}

impl RgTransientDesc {
    #[inline]
    pub fn kind(&self) -> RgResourceKind {
        match self {
            Self::Texture(_) => RgResourceKind::Texture,
            Self::Buffer(_) => RgResourceKind::Buffer,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Texture(desc) => desc.validate(),
            Self::Buffer(desc) => desc.validate(),
        }
    }
}

impl From<RgTextureDesc> for RgTransientDesc {
    fn from(desc: RgTextureDesc) -> Self {
        Self::Texture(desc)
    }
}

impl From<RgBufferDesc> for RgTransientDesc {
    fn from(desc: RgBufferDesc) -> Self {
        Self::Buffer(desc)
    }
}

/// 资源来源
#[derive(Clone, Debug)]
pub enum RgResourceSource {
    /// 外部导入的资源
    Imported {
        kind: RgResourceKind,
        physical: PhysicalResourceId,
        /// 进入 graph 时的状态
        initial_state: DeviceResourceState,
        /// 所有 Pass 执行完之后需要转换到的状态，`UNDEFINED` 表示不关心
        final_state: DeviceResourceState,
        /// 外部纹理的描述，供依赖它的 transient 纹理解析
        texture: Option<RgTextureDesc>,
    },
    /// Graph 内部创建的临时资源
    Transient {
        /// 不考虑依赖时的描述
        desc: RgTransientDesc,
        dependency: RgTextureDependency,
    },
}

/// Graph 中的一个资源
#[derive(Clone, Debug)]
pub struct RgResource {
    pub name: String,
    pub source: RgResourceSource,
    /// 显式声明为输出，写入它的 Pass 不会被剔除
    pub is_output: bool,
}

impl RgResource {
    pub fn imported(
        name: impl Into<String>,
        kind: RgResourceKind,
        physical: PhysicalResourceId,
        initial_state: DeviceResourceState,
        final_state: DeviceResourceState,
    ) -> Self {
        Self {
            name: name.into(),
            source: RgResourceSource::Imported {
                kind,
                physical,
                initial_state,
                final_state,
                texture: None,
            },
            is_output: false,
        }
    }

    pub fn imported_texture(
        name: impl Into<String>,
        physical: PhysicalResourceId,
        desc: RgTextureDesc,
        initial_state: DeviceResourceState,
        final_state: DeviceResourceState,
    ) -> Self {
        Self {
            name: name.into(),
            source: RgResourceSource::Imported {
                kind: RgResourceKind::Texture,
                physical,
                initial_state,
                final_state,
                texture: Some(desc),
            },
            is_output: false,
        }
    }

    pub fn transient(name: impl Into<String>, desc: impl Into<RgTransientDesc>) -> Self {
        Self {
            name: name.into(),
            source: RgResourceSource::Transient {
                desc: desc.into(),
                dependency: RgTextureDependency::default(),
            },
            is_output: false,
        }
    }

    /// 部分字段跟随其他导入纹理的 transient 纹理
    pub fn dependent_texture(name: impl Into<String>, desc: RgTextureDesc, dependency: RgTextureDependency) -> Self {
        Self {
            name: name.into(),
            source: RgResourceSource::Transient {
                desc: desc.into(),
                dependency,
            },
            is_output: false,
        }
    }

    #[inline]
    pub fn kind(&self) -> RgResourceKind {
        match &self.source {
            RgResourceSource::Imported { kind, .. } => *kind,
            RgResourceSource::Transient { desc, .. } => desc.kind(),
        }
    }

    #[inline]
    pub fn is_imported(&self) -> bool {
        matches!(self.source, RgResourceSource::Imported { .. })
    }

    /// 外部资源，或者显式标记的输出
    #[inline]
    pub fn is_external(&self) -> bool {
        self.is_imported() || self.is_output
    }

    /// 不考虑依赖时的 transient 描述
    #[inline]
    pub fn transient_desc(&self) -> Option<&RgTransientDesc> {
        match &self.source {
            RgResourceSource::Transient { desc, .. } => Some(desc),
            RgResourceSource::Imported { .. } => None,
        }
    }

    #[inline]
    pub fn texture_dependency(&self) -> Option<&RgTextureDependency> {
        match &self.source {
            RgResourceSource::Transient { dependency, .. } => Some(dependency),
            RgResourceSource::Imported { .. } => None,
        }
    }

    #[inline]
    pub fn imported_texture_desc(&self) -> Option<RgTextureDesc> {
        match &self.source {
            RgResourceSource::Imported { texture, .. } => *texture,
            RgResourceSource::Transient { .. } => None,
        }
    }

    #[inline]
    pub fn imported_physical(&self) -> Option<PhysicalResourceId> {
        match &self.source {
            RgResourceSource::Imported { physical, .. } => Some(*physical),
            RgResourceSource::Transient { .. } => None,
        }
    }
}
