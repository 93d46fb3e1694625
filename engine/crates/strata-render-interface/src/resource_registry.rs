//! 基于槽位的资源注册表
//!
//! 槽位通过 free-list 复用（后进先出）。句柄计数归零后，释放信息通过 channel 回到注册表，
//! 在之后的每次 `clear_destroy_queue` 中倒数，倒数结束才真正销毁资源。

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::handles::{GfxHandle, GfxHandleCounter, GfxRegistryOwner, GfxReleaseTicket};

struct GfxRegistrySlot<T> {
    resource: Option<T>,
    counter: Option<Arc<GfxHandleCounter>>,
    generation: u32,
}

struct GfxPendingDestroy {
    ticket: GfxReleaseTicket,
    frames_remaining: u32,
}

pub struct GfxResourceRegistry<T> {
    owner: Arc<GfxRegistryOwner>,
    slots: Vec<GfxRegistrySlot<T>>,
    free_list: Vec<u32>,
    destroy_queue: Vec<GfxPendingDestroy>,

    release_tx: Sender<GfxReleaseTicket>,
    release_rx: Receiver<GfxReleaseTicket>,

    /// frames_in_flight + 1
    frame_delay: u32,
    next_generation: u32,
}

// new & init
impl<T> GfxResourceRegistry<T> {
    pub fn new(name: impl Into<String>, frames_in_flight: usize) -> Self {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        Self {
            owner: Arc::new(GfxRegistryOwner::new(name)),
            slots: Vec::new(),
            free_list: Vec::new(),
            destroy_queue: Vec::new(),
            release_tx,
            release_rx,
            frame_delay: frames_in_flight as u32 + 1,
            next_generation: 1,
        }
    }
}

// getters
impl<T> GfxResourceRegistry<T> {
    #[inline]
    pub fn name(&self) -> &str {
        self.owner.name()
    }

    #[inline]
    pub fn frame_delay(&self) -> u32 {
        self.frame_delay
    }

    /// 仍然持有资源的槽位数量
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.resource.is_some()).count()
    }

    /// 等待销毁的槽位数量（包括还没有被 `clear_destroy_queue` 收取的释放）
    pub fn pending_destroy_count(&self) -> usize {
        self.destroy_queue.len() + self.release_rx.len()
    }

    #[inline]
    pub fn get_resource(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize).and_then(|slot| slot.resource.as_ref())
    }

    #[inline]
    pub fn get_resource_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize).and_then(|slot| slot.resource.as_mut())
    }

    /// 为槽位签发一个新句柄，计数加一
    ///
    /// 计数已经归零、正在等待销毁的槽位也可以重新签发，此时销毁会被取消
    pub fn get_handle(&self, index: u32) -> Option<GfxHandle<T>> {
        let slot = self.slots.get(index as usize)?;
        slot.resource.as_ref()?;
        slot.counter.as_ref().map(GfxHandle::from_counter)
    }

    /// 通过句柄获取资源；其他注册表或已经销毁的槽位的句柄返回 None
    pub fn resolve(&self, handle: &GfxHandle<T>) -> Option<&T> {
        let (slot, _) = self.slot_of(handle)?;
        slot.resource.as_ref()
    }

    pub fn resolve_mut(&mut self, handle: &GfxHandle<T>) -> Option<&mut T> {
        let (_, index) = self.slot_of(handle)?;
        self.slots[index].resource.as_mut()
    }

    fn slot_of(&self, handle: &GfxHandle<T>) -> Option<(&GfxRegistrySlot<T>, usize)> {
        if !handle.belongs_to(&self.owner) {
            return None;
        }
        let counter = handle.counter()?;
        let index = handle.index()? as usize;
        let slot = self.slots.get(index)?;
        let same_counter = slot.counter.as_ref().is_some_and(|c| Arc::ptr_eq(c, counter));
        same_counter.then_some((slot, index))
    }
}

// insert
impl<T> GfxResourceRegistry<T> {
    /// 放入资源，优先复用 free-list 中的槽位
    pub fn insert(&mut self, resource: T) -> u32 {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.slots.push(GfxRegistrySlot {
                    resource: None,
                    counter: None,
                    generation: 0,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        let tx = self.release_tx.clone();
        let deleter = Box::new(move |ticket: GfxReleaseTicket| {
            // 注册表已经销毁时 send 会失败，此时没有需要销毁的东西
            let _ = tx.send(ticket);
        });
        let counter = Arc::new(GfxHandleCounter::new(Arc::downgrade(&self.owner), index, generation, deleter));

        let slot = &mut self.slots[index as usize];
        slot.resource = Some(resource);
        slot.counter = Some(counter);
        slot.generation = generation;

        log::trace!("{}: insert slot {} (gen {})", self.owner.name(), index, generation);
        index
    }

    /// 放入资源并直接签发句柄
    pub fn insert_handle(&mut self, resource: T) -> GfxHandle<T> {
        let index = self.insert(resource);
        let handle = self.slots[index as usize].counter.as_ref().map(GfxHandle::from_counter);
        handle.unwrap_or_default()
    }
}

// destroy
impl<T> GfxResourceRegistry<T> {
    /// 每帧开始时调用一次
    ///
    /// 收取新的释放信息，所有排队项倒数一帧，倒数结束且期间没有被重新签发的槽位会被销毁，
    /// 返回本次销毁的数量
    pub fn clear_destroy_queue(&mut self, mut destroy: impl FnMut(u32, T)) -> usize {
        let frame_delay = self.frame_delay;
        self.destroy_queue.extend(self.release_rx.try_iter().map(|ticket| GfxPendingDestroy {
            ticket,
            frames_remaining: frame_delay,
        }));

        let mut expired = Vec::new();
        self.destroy_queue.retain_mut(|entry| {
            entry.frames_remaining = entry.frames_remaining.saturating_sub(1);
            if entry.frames_remaining == 0 {
                expired.push(entry.ticket);
                false
            } else {
                true
            }
        });

        let mut destroyed = 0;
        for ticket in expired {
            let Some(slot) = self.slots.get_mut(ticket.index as usize) else {
                continue;
            };
            if slot.generation != ticket.generation {
                continue;
            }
            let Some(counter) = slot.counter.as_ref() else {
                continue;
            };
            if counter.count() != 0 || counter.epoch() != ticket.epoch {
                log::trace!("{}: slot {} was re-acquired, skip destroy", self.owner.name(), ticket.index);
                continue;
            }

            counter.mark_dead();
            slot.counter = None;
            if let Some(resource) = slot.resource.take() {
                log::debug!("{}: destroy slot {}", self.owner.name(), ticket.index);
                destroy(ticket.index, resource);
                self.free_list.push(ticket.index);
                destroyed += 1;
            }
        }
        destroyed
    }

    /// 关闭时调用，无视句柄计数销毁所有资源
    pub fn clear_all(&mut self, mut destroy: impl FnMut(u32, T)) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(counter) = slot.counter.take() {
                if counter.count() > 0 {
                    log::debug!(
                        "{}: slot {} destroyed with {} outstanding handles",
                        self.owner.name(),
                        index,
                        counter.count()
                    );
                }
                counter.mark_dead();
            }
            if let Some(resource) = slot.resource.take() {
                destroy(index as u32, resource);
            }
        }
        self.slots.clear();
        self.free_list.clear();
        self.destroy_queue.clear();
        self.release_rx.try_iter().for_each(drop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 模拟帧循环：每帧开始时 clear_destroy_queue，返回本帧销毁的 index
    fn begin_frame(registry: &mut GfxResourceRegistry<String>) -> Vec<u32> {
        let mut destroyed = Vec::new();
        registry.clear_destroy_queue(|index, _| destroyed.push(index));
        destroyed
    }

    #[test]
    fn slot_is_enqueued_once_when_the_last_handle_drops() {
        let mut registry = GfxResourceRegistry::new("test", 2);
        let handle = registry.insert_handle("a".to_string());

        let copies: Vec<_> = (0..4).map(|_| handle.clone()).collect();
        drop(handle);
        assert_eq!(registry.pending_destroy_count(), 0);
        drop(copies);
        assert_eq!(registry.pending_destroy_count(), 1);
    }

    #[test]
    fn destroyed_exactly_frames_in_flight_plus_one_frames_later() {
        let fif = 2;
        let mut registry = GfxResourceRegistry::new("test", fif);

        // frame 0
        begin_frame(&mut registry);
        let handle = registry.insert_handle("a".to_string());
        drop(handle);

        for frame in 1..=fif {
            assert!(begin_frame(&mut registry).is_empty(), "destroyed too early at frame {frame}");
        }
        // frame fif + 1
        assert_eq!(begin_frame(&mut registry), vec![0]);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.pending_destroy_count(), 0);
    }

    #[test]
    fn freed_index_is_reused_before_appending() {
        let mut registry = GfxResourceRegistry::new("test", 1);
        let a = registry.insert_handle("a".to_string());
        let _b = registry.insert_handle("b".to_string());
        drop(a);
        begin_frame(&mut registry);
        assert_eq!(begin_frame(&mut registry), vec![0]);

        assert_eq!(registry.insert("c".to_string()), 0);
        assert_eq!(registry.insert("d".to_string()), 2);
    }

    #[test]
    fn reacquired_slot_survives_its_pending_destroy() {
        let mut registry = GfxResourceRegistry::new("test", 1);
        let index = registry.insert("a".to_string());
        drop(registry.get_handle(index));
        assert_eq!(registry.pending_destroy_count(), 1);

        let revived = registry.get_handle(index).unwrap();
        begin_frame(&mut registry);
        assert!(begin_frame(&mut registry).is_empty());
        assert!(revived.is_valid());
        assert_eq!(registry.get_resource(index).map(String::as_str), Some("a"));

        drop(revived);
        begin_frame(&mut registry);
        assert_eq!(begin_frame(&mut registry), vec![index]);
        assert!(registry.get_handle(index).is_none());
    }

    #[test]
    fn resolve_rejects_foreign_and_stale_handles() {
        let mut registry = GfxResourceRegistry::new("a", 1);
        let mut other = GfxResourceRegistry::new("b", 1);
        let handle = registry.insert_handle("a".to_string());
        let foreign = other.insert_handle("b".to_string());

        assert_eq!(registry.resolve(&handle).map(String::as_str), Some("a"));
        assert!(registry.resolve(&foreign).is_none());

        let mut destroyed = Vec::new();
        registry.clear_all(|_, res| destroyed.push(res));
        assert_eq!(destroyed, vec!["a".to_string()]);
        assert!(!handle.is_valid());
        assert!(registry.resolve(&handle).is_none());

        // 同一个 index 被新资源占用后，旧句柄仍然无法访问
        registry.insert("c".to_string());
        assert!(registry.resolve(&handle).is_none());
        drop(handle);
        assert!(begin_frame(&mut registry).is_empty());
        assert!(begin_frame(&mut registry).is_empty());
        assert_eq!(registry.live_count(), 1);
        other.clear_all(|_, _| {});
    }

    #[test]
    fn handles_outliving_the_registry_are_harmless() {
        let mut registry = GfxResourceRegistry::new("test", 1);
        let handle = registry.insert_handle("a".to_string());
        registry.clear_all(|_, _| {});
        drop(registry);
        assert!(!handle.is_valid());
        drop(handle);
    }
}
