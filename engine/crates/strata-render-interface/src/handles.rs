//! 引用计数的资源句柄
//!
//! 同一个槽位的所有句柄共享一个计数器。句柄 clone 时计数加一，drop 时减一；
//! 计数从 1 变为 0 时调用注册表提供的 deleter，deleter 只负责把槽位放进销毁队列，
//! 真正的销毁由注册表在若干帧之后完成。

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use strata_gfx::resources::buffer::GfxBuffer;
use strata_gfx::resources::image::GfxImage;
use strata_gfx::resources::pipeline_layout::GfxPipelineLayout;
use strata_gfx::resources::sampler::GfxSampler;
use strata_gfx::resources::shader_module::GfxShaderModule;

/// 注册表的身份标记，句柄通过它判断注册表是否还存在
#[derive(Debug)]
pub struct GfxRegistryOwner {
    name: String,
}

impl GfxRegistryOwner {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 计数归零时交给 deleter 的信息
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxReleaseTicket {
    pub index: u32,
    /// 槽位被 insert 时分配的代数
    pub generation: u32,
    /// 该计数器第几次归零
    pub epoch: u32,
}

pub(crate) type GfxHandleDeleter = Box<dyn Fn(GfxReleaseTicket) + Send + Sync>;

/// 一个槽位的共享计数器，槽位每次 insert 都会新建一个
pub(crate) struct GfxHandleCounter {
    owner: Weak<GfxRegistryOwner>,
    index: u32,
    generation: u32,
    count: AtomicU32,
    epoch: AtomicU32,
    /// 槽位里的对象是否还存在
    live: AtomicBool,
    deleter: GfxHandleDeleter,
}

impl GfxHandleCounter {
    pub(crate) fn new(owner: Weak<GfxRegistryOwner>, index: u32, generation: u32, deleter: GfxHandleDeleter) -> Self {
        Self {
            owner,
            index,
            generation,
            count: AtomicU32::new(0),
            epoch: AtomicU32::new(0),
            live: AtomicBool::new(true),
            deleter,
        }
    }

    #[inline]
    pub(crate) fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn mark_dead(&self) {
        self.live.store(false, Ordering::Release);
    }

    #[inline]
    pub(crate) fn acquire(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// 返回是否是这次释放让计数归零
    fn release(&self) -> bool {
        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "handle counter underflow");
        if prev != 1 {
            return false;
        }
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        (self.deleter)(GfxReleaseTicket {
            index: self.index,
            generation: self.generation,
            epoch,
        });
        true
    }
}

/// 资源句柄
///
/// `T` 只用于区分资源种类，句柄本身不持有资源。
pub struct GfxHandle<T> {
    counter: Option<Arc<GfxHandleCounter>>,
    _marker: PhantomData<fn() -> T>,
}

pub type GfxImageHandle = GfxHandle<GfxImage>;
pub type GfxBufferHandle = GfxHandle<GfxBuffer>;
pub type GfxShaderModuleHandle = GfxHandle<GfxShaderModule>;
pub type GfxPipelineLayoutHandle = GfxHandle<GfxPipelineLayout>;
pub type GfxSamplerHandle = GfxHandle<GfxSampler>;

// new & init
impl<T> GfxHandle<T> {
    /// 空句柄，永远无效
    #[inline]
    pub const fn null() -> Self {
        Self {
            counter: None,
            _marker: PhantomData,
        }
    }

    /// 计数加一后生成句柄
    pub(crate) fn from_counter(counter: &Arc<GfxHandleCounter>) -> Self {
        counter.acquire();
        Self {
            counter: Some(counter.clone()),
            _marker: PhantomData,
        }
    }
}

// getters
impl<T> GfxHandle<T> {
    /// 注册表仍然存在，并且槽位中的对象还没有被销毁
    pub fn is_valid(&self) -> bool {
        self.counter
            .as_ref()
            .is_some_and(|c| c.owner.strong_count() > 0 && c.live.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.counter.is_none()
    }

    #[inline]
    pub fn index(&self) -> Option<u32> {
        self.counter.as_ref().map(|c| c.index)
    }

    /// 当前共享计数，空句柄返回 0
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.counter.as_ref().map_or(0, |c| c.count())
    }

    #[inline]
    pub(crate) fn counter(&self) -> Option<&Arc<GfxHandleCounter>> {
        self.counter.as_ref()
    }

    pub(crate) fn belongs_to(&self, owner: &Arc<GfxRegistryOwner>) -> bool {
        self.counter.as_ref().is_some_and(|c| std::ptr::eq(c.owner.as_ptr(), Arc::as_ptr(owner)))
    }
}

// release
impl<T> GfxHandle<T> {
    /// 提前释放句柄，之后句柄变为空句柄
    ///
    /// 返回 true 表示这次释放让计数归零（deleter 已被调用）
    pub fn release(&mut self) -> bool {
        match self.counter.take() {
            Some(counter) => counter.release(),
            None => false,
        }
    }
}

impl<T> Default for GfxHandle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for GfxHandle<T> {
    fn clone(&self) -> Self {
        if let Some(counter) = &self.counter {
            counter.acquire();
        }
        Self {
            counter: self.counter.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for GfxHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> GfxHandle<T> {
    fn identity(&self) -> Option<(*const GfxRegistryOwner, u32)> {
        self.counter.as_ref().map(|c| (c.owner.as_ptr(), c.index))
    }
}

/// 指向同一个注册表的同一个槽位时相等
impl<T> PartialEq for GfxHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<T> Eq for GfxHandle<T> {}

impl<T> Hash for GfxHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.identity() {
            Some((owner, index)) => {
                (owner as usize).hash(state);
                index.hash(state);
            }
            None => 0usize.hash(state),
        }
    }
}

impl<T> fmt::Debug for GfxHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.counter {
            Some(c) => {
                let owner = c.owner.upgrade().map_or_else(|| "<dropped>".to_string(), |o| o.name.clone());
                write!(f, "GfxHandle({}#{}, rc={})", owner, c.index, c.count())
            }
            None => write!(f, "GfxHandle(null)"),
        }
    }
}

/// 不持有计数的句柄
///
/// 只用来判断某个 [`GfxHandle`] 是否还是同一个对象，不会阻止对象被销毁。
pub struct GfxWeakHandle<T> {
    counter: Weak<GfxHandleCounter>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> GfxHandle<T> {
    pub fn downgrade(&self) -> GfxWeakHandle<T> {
        GfxWeakHandle {
            counter: self.counter.as_ref().map_or_else(Weak::new, Arc::downgrade),
            _marker: PhantomData,
        }
    }
}

impl<T> GfxWeakHandle<T> {
    /// `handle` 是否来自同一次 insert；槽位被复用后不再匹配
    pub fn refers_to(&self, handle: &GfxHandle<T>) -> bool {
        handle.counter.as_ref().is_some_and(|c| std::ptr::eq(self.counter.as_ptr(), Arc::as_ptr(c)))
    }

    /// 还有强句柄，并且对象没有被销毁
    pub fn is_alive(&self) -> bool {
        self.counter.upgrade().is_some_and(|c| c.count() > 0 && c.live.load(Ordering::Acquire))
    }
}

impl<T> PartialEq for GfxWeakHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.counter, &other.counter)
    }
}

impl<T> Eq for GfxWeakHandle<T> {}

impl<T> Clone for GfxWeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            counter: self.counter.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for GfxWeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.counter.upgrade() {
            Some(c) => write!(f, "GfxWeakHandle(#{}, rc={})", c.index, c.count()),
            None => write!(f, "GfxWeakHandle(expired)"),
        }
    }
}
