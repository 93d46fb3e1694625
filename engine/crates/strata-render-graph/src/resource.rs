//! 逻辑资源表
//!
//! 每个逻辑资源有一个稳定的 [`RgResourceIndex`] 和一个主 label，alias 把额外的 label
//! 映射到同一个资源。alias 可以指向另一个 alias，编译时按链解析并检测循环。

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;

use crate::buffer_resource::RgBufferResource;
use crate::image_resource::RgImageResource;
use crate::resource_state::RgResourceState;

/// 逻辑资源在 graph 中的索引
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgResourceIndex(pub u32);

impl RgResourceIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RgResourceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 通过 label 或 index 引用逻辑资源
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceRef {
    Label(String),
    Index(RgResourceIndex),
}

impl From<&str> for RgResourceRef {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl From<String> for RgResourceRef {
    fn from(label: String) -> Self {
        Self::Label(label)
    }
}

impl From<&String> for RgResourceRef {
    fn from(label: &String) -> Self {
        Self::Label(label.clone())
    }
}

impl From<RgResourceIndex> for RgResourceRef {
    fn from(index: RgResourceIndex) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for RgResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(label) => f.write_str(label),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

#[derive(Debug)]
pub enum RgResourceKind {
    Image(RgImageResource),
    Buffer(RgBufferResource),
}

impl RgResourceKind {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Buffer(_) => "buffer",
        }
    }
}

/// 逻辑资源条目
#[derive(Debug)]
pub struct RgResource {
    pub(crate) label: String,
    pub(crate) kind: RgResourceKind,
    /// 下一次编译时资源所处的状态
    pub(crate) current_state: RgResourceState,
    /// 内容是否有效（被写过，或由外部初始化）
    pub(crate) initialized: bool,
}

// getters
impl RgResource {
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn kind(&self) -> &RgResourceKind {
        &self.kind
    }

    #[inline]
    pub fn as_image(&self) -> Option<&RgImageResource> {
        match &self.kind {
            RgResourceKind::Image(image) => Some(image),
            RgResourceKind::Buffer(_) => None,
        }
    }

    #[inline]
    pub fn as_buffer(&self) -> Option<&RgBufferResource> {
        match &self.kind {
            RgResourceKind::Buffer(buffer) => Some(buffer),
            RgResourceKind::Image(_) => None,
        }
    }

    #[inline]
    pub fn current_state(&self) -> RgResourceState {
        self.current_state
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    pub fn is_imported(&self) -> bool {
        match &self.kind {
            RgResourceKind::Image(image) => image.imported,
            RgResourceKind::Buffer(buffer) => buffer.imported,
        }
    }

    /// `reset()` 之后是否保留
    ///
    /// 导入的资源只有标记为 persistent 时才保留，否则 graph 不再持有外部的 handle。
    pub fn survives_reset(&self) -> bool {
        match &self.kind {
            RgResourceKind::Image(image) => image.desc.persistent || (!image.imported && image.desc.match_swapchain),
            RgResourceKind::Buffer(buffer) => buffer.desc.persistent,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum RgLabelTarget {
    /// 资源的主 label
    Resource(RgResourceIndex),
    Alias(RgResourceRef),
}

/// label 解析失败的原因
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RgLookupError {
    Unresolved(String),
    Cyclic(String),
}

#[derive(Default)]
pub struct RgResourceTable {
    resources: Vec<Option<RgResource>>,
    labels: IndexMap<String, RgLabelTarget>,
}

// register
impl RgResourceTable {
    /// 注册资源；label 已经存在时更新原资源并返回同一个 index
    pub(crate) fn register(&mut self, label: &str, kind: RgResourceKind) -> RgResourceIndex {
        if let Some(RgLabelTarget::Resource(index)) = self.labels.get(label).cloned()
            && let Some(existing) = self.resources.get_mut(index.index()).and_then(Option::as_mut)
        {
            Self::update(existing, kind);
            return index;
        }

        if let Some(RgLabelTarget::Alias(target)) = self.labels.get(label) {
            log::warn!("RenderGraph: label \"{}\" was an alias of \"{}\", now registered as a resource", label, target);
        }

        let imported = match &kind {
            RgResourceKind::Image(image) => image.imported,
            RgResourceKind::Buffer(buffer) => buffer.imported,
        };
        let resource = RgResource {
            label: label.to_string(),
            kind,
            current_state: RgResourceState::UNDEFINED,
            initialized: imported,
        };

        // 优先复用最小的空槽位，保证重复声明时 index 稳定
        let index = match self.resources.iter().position(Option::is_none) {
            Some(slot) => {
                self.resources[slot] = Some(resource);
                slot
            }
            None => {
                self.resources.push(Some(resource));
                self.resources.len() - 1
            }
        };
        let index = RgResourceIndex(index as u32);
        self.labels.insert(label.to_string(), RgLabelTarget::Resource(index));
        index
    }

    fn update(existing: &mut RgResource, kind: RgResourceKind) {
        let same_backing = match (&existing.kind, &kind) {
            (RgResourceKind::Image(old), RgResourceKind::Image(new)) => new.backing.is_none() || old.backing == new.backing,
            (RgResourceKind::Buffer(old), RgResourceKind::Buffer(new)) => {
                new.backing.is_none() || old.backing == new.backing
            }
            _ => false,
        };

        match (&mut existing.kind, kind) {
            (RgResourceKind::Image(old), RgResourceKind::Image(new)) if same_backing && !(old.imported && !new.imported) => {
                old.desc = new.desc;
            }
            (RgResourceKind::Buffer(old), RgResourceKind::Buffer(new))
                if same_backing && !(old.imported && !new.imported) =>
            {
                old.desc = new.desc;
            }
            (_, kind) => {
                // 物理资源变了，之前记录的状态不再有效
                existing.initialized = match &kind {
                    RgResourceKind::Image(image) => image.imported,
                    RgResourceKind::Buffer(buffer) => buffer.imported,
                };
                existing.kind = kind;
                existing.current_state = RgResourceState::UNDEFINED;
            }
        }
    }

    /// 让 `alias` 解析到 `target`，返回 target 当前能解析到的 index
    pub(crate) fn add_alias(&mut self, target: RgResourceRef, alias: &str) -> Option<RgResourceIndex> {
        if let Some(RgLabelTarget::Resource(index)) = self.labels.get(alias) {
            log::error!("RenderGraph: alias \"{}\" collides with the label of resource {}", alias, index);
            return None;
        }
        self.labels.insert(alias.to_string(), RgLabelTarget::Alias(target));
        self.resolve(&RgResourceRef::Label(alias.to_string())).ok()
    }
}

// lookup
impl RgResourceTable {
    pub(crate) fn resolve(&self, resource: &RgResourceRef) -> Result<RgResourceIndex, RgLookupError> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = resource;
        loop {
            match current {
                RgResourceRef::Index(index) => {
                    return match self.get(*index) {
                        Some(_) => Ok(*index),
                        None => Err(RgLookupError::Unresolved(index.to_string())),
                    };
                }
                RgResourceRef::Label(label) => {
                    if !visited.insert(label.as_str()) {
                        return Err(RgLookupError::Cyclic(resource.to_string()));
                    }
                    match self.labels.get(label) {
                        Some(RgLabelTarget::Resource(index)) => return Ok(*index),
                        Some(RgLabelTarget::Alias(next)) => current = next,
                        None => return Err(RgLookupError::Unresolved(label.clone())),
                    }
                }
            }
        }
    }

    #[inline]
    pub fn lookup(&self, resource: &RgResourceRef) -> Option<RgResourceIndex> {
        self.resolve(resource).ok()
    }

    #[inline]
    pub fn get(&self, index: RgResourceIndex) -> Option<&RgResource> {
        self.resources.get(index.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: RgResourceIndex) -> Option<&mut RgResource> {
        self.resources.get_mut(index.index()).and_then(Option::as_mut)
    }

    /// 资源的主 label，找不到时返回 `<unknown>`
    pub fn label_of(&self, index: RgResourceIndex) -> &str {
        self.get(index).map_or("<unknown>", |r| r.label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (RgResourceIndex, &RgResource)> {
        self.resources
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (RgResourceIndex(i as u32), r)))
    }

    /// 所有 alias label 及其最终解析结果
    pub fn aliases(&self) -> Vec<(&str, Option<RgResourceIndex>)> {
        self.labels
            .iter()
            .filter(|(_, target)| matches!(target, RgLabelTarget::Alias(_)))
            .map(|(label, _)| (label.as_str(), self.lookup(&RgResourceRef::Label(label.clone()))))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.iter().flatten().count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// reset
impl RgResourceTable {
    /// 移除所有 alias 以及不需要跨帧保留的资源，返回被移除的资源
    pub(crate) fn reset(&mut self) -> Vec<RgResource> {
        let mut removed = Vec::new();
        for slot in self.resources.iter_mut() {
            if slot.as_ref().is_some_and(|r| !r.survives_reset())
                && let Some(resource) = slot.take()
            {
                removed.push(resource);
            }
        }
        let resources = &self.resources;
        self.labels.retain(|_, target| match target {
            RgLabelTarget::Resource(index) => resources.get(index.index()).is_some_and(Option::is_some),
            RgLabelTarget::Alias(_) => false,
        });
        while matches!(self.resources.last(), Some(None)) {
            self.resources.pop();
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.resources.clear();
        self.labels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_resource::RgBufferDesc;
    use crate::image_resource::RgImageDesc;
    use ash::vk;

    fn image(desc: RgImageDesc) -> RgResourceKind {
        RgResourceKind::Image(RgImageResource::new(desc, None))
    }

    fn buffer(size: u64) -> RgResourceKind {
        RgResourceKind::Buffer(RgBufferResource::new(
            RgBufferDesc::new(size, vk::BufferUsageFlags::UNIFORM_BUFFER),
            None,
        ))
    }

    #[test]
    fn reregistering_a_label_keeps_its_index() {
        let mut table = RgResourceTable::default();
        let a = table.register("color", image(RgImageDesc::new_2d(64, 64, vk::Format::R8G8B8A8_UNORM)));
        let b = table.register("camera", buffer(64));
        let again = table.register("color", image(RgImageDesc::new_2d(128, 128, vk::Format::R8G8B8A8_UNORM)));

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(table.get(a).and_then(|r| r.as_image()).map(|i| i.desc().width), Some(128));
    }

    #[test]
    fn alias_chains_resolve_to_the_original() {
        let mut table = RgResourceTable::default();
        let color = table.register("color", image(RgImageDesc::default()));

        assert_eq!(table.add_alias("color".into(), "lit"), Some(color));
        assert_eq!(table.add_alias("lit".into(), "final"), Some(color));
        assert_eq!(table.add_alias(color.into(), "by-index"), Some(color));
        assert_eq!(table.lookup(&"final".into()), Some(color));
        // 目标还没有注册时返回 None，注册之后可以解析
        assert_eq!(table.add_alias("later".into(), "early-alias"), None);
        let later = table.register("later", buffer(16));
        assert_eq!(table.lookup(&"early-alias".into()), Some(later));
    }

    #[test]
    fn cyclic_aliases_are_detected() {
        let mut table = RgResourceTable::default();
        table.add_alias("b".into(), "a");
        table.add_alias("a".into(), "b");
        assert_eq!(table.resolve(&"a".into()), Err(RgLookupError::Cyclic("a".to_string())));
        assert_eq!(table.resolve(&"missing".into()), Err(RgLookupError::Unresolved("missing".to_string())));
    }

    #[test]
    fn reset_keeps_persistent_resources_and_drops_aliases() {
        let mut table = RgResourceTable::default();
        let transient = table.register("transient", image(RgImageDesc::default()));
        let history = table.register("history", image(RgImageDesc::default().persistent()));
        table.add_alias("history".into(), "history-alias");

        let removed = table.reset();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].label(), "transient");
        assert!(table.get(transient).is_none());
        assert_eq!(table.lookup(&"history".into()), Some(history));
        assert_eq!(table.lookup(&"history-alias".into()), None);

        // 空出来的槽位会被下一次注册复用
        assert_eq!(table.register("transient", image(RgImageDesc::default())), transient);
    }
}
