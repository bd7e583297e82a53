use slotmap::SlotMap;

use super::resource::RgResource;
use super::resource_handle::RgResourceHandle;

/// 资源注册表
///
/// 管理 RenderGraph 中声明的所有资源，句柄在资源被移除后失效。
#[derive(Default)]
pub struct RgResourceRegistry {
    resources: SlotMap<RgResourceHandle, RgResource>,
}

// new & register
impl RgResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn register(&mut self, resource: RgResource) -> RgResourceHandle {
        self.resources.insert(resource)
    }

    #[inline]
    pub fn remove(&mut self, handle: RgResourceHandle) -> Option<RgResource> {
        self.resources.remove(handle)
    }
}

// getter & iter
impl RgResourceRegistry {
    #[inline]
    pub fn get(&self, handle: RgResourceHandle) -> Option<&RgResource> {
        self.resources.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: RgResourceHandle) -> Option<&mut RgResource> {
        self.resources.get_mut(handle)
    }

    #[inline]
    pub fn contains(&self, handle: RgResourceHandle) -> bool {
        self.resources.contains_key(handle)
    }

    /// 调试用名称，失效句柄返回 `<unknown>`
    #[inline]
    pub fn name(&self, handle: RgResourceHandle) -> &str {
        self.resources.get(handle).map(|r| r.name.as_str()).unwrap_or("<unknown>")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (RgResourceHandle, &RgResource)> {
        self.resources.iter()
    }
}
