//! GPU 计时
//!
//! 每个 frame-in-flight 槽位一个 timestamp query pool，每个 pass 占用两个 query：
//! `2i` 在 pass 开始时写入，`2i + 1` 在 pass 结束时写入。

use ash::vk;

use strata_gfx::device::GfxDevice;
use strata_gfx::{GfxError, GfxResult};

/// 一个 pass 在某个 frame-in-flight 槽位里的计时
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgPassTimer {
    label: String,
    query_pool: vk::QueryPool,
    begin_query: u32,
    end_query: u32,
}

impl RgPassTimer {
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn query_pool(&self) -> vk::QueryPool {
        self.query_pool
    }

    #[inline]
    pub fn begin_query(&self) -> u32 {
        self.begin_query
    }

    #[inline]
    pub fn end_query(&self) -> u32 {
        self.end_query
    }

    /// 读取两个 timestamp 并换算成毫秒
    ///
    /// 只能在对应槽位的帧执行完之后调用
    pub fn elapsed_ms(&self, device: &dyn GfxDevice) -> GfxResult<f64> {
        let values = device.read_timestamps(self.query_pool, self.begin_query, 2)?;
        match values.as_slice() {
            [begin, end] => {
                let ticks = end.saturating_sub(*begin);
                Ok(ticks as f64 * device.timestamp_period_ns() as f64 / 1_000_000.0)
            }
            _ => Err(GfxError::Vk(vk::Result::NOT_READY)),
        }
    }
}

struct RgTimerSlot {
    query_pool: vk::QueryPool,
    capacity: u32,
    timers: Vec<RgPassTimer>,
}

#[derive(Default)]
pub(crate) struct RgGpuTimers {
    slots: Vec<Option<RgTimerSlot>>,
}

impl RgGpuTimers {
    /// 为 `slot` 准备足够容纳所有 pass 的 query pool，返回该 pool
    pub(crate) fn prepare<'l>(
        &mut self,
        device: &mut dyn GfxDevice,
        slot: usize,
        labels: impl ExactSizeIterator<Item = &'l str>,
    ) -> GfxResult<vk::QueryPool> {
        let needed = labels.len() as u32 * 2;
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }

        let reusable = self.slots[slot].as_ref().is_some_and(|s| s.capacity >= needed);
        if !reusable {
            if let Some(old) = self.slots[slot].take() {
                device.destroy_query_pool(old.query_pool);
            }
            let capacity = needed.next_power_of_two().max(16);
            let query_pool = device.create_timestamp_pool(capacity, &format!("render-graph-timers-{slot}"))?;
            log::debug!("RenderGraph: timer pool for slot {} holds {} queries", slot, capacity);
            self.slots[slot] = Some(RgTimerSlot {
                query_pool,
                capacity,
                timers: Vec::new(),
            });
        }

        let Some(timer_slot) = self.slots[slot].as_mut() else {
            return Err(GfxError::Vk(vk::Result::ERROR_INITIALIZATION_FAILED));
        };
        let query_pool = timer_slot.query_pool;
        timer_slot.timers = labels
            .enumerate()
            .map(|(i, label)| RgPassTimer {
                label: label.to_string(),
                query_pool,
                begin_query: 2 * i as u32,
                end_query: 2 * i as u32 + 1,
            })
            .collect();
        Ok(query_pool)
    }

    pub(crate) fn timers(&self, slot: usize) -> &[RgPassTimer] {
        self.slots.get(slot).and_then(Option::as_ref).map(|s| s.timers.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub(crate) fn destroy(&mut self, device: &mut dyn GfxDevice) {
        for slot in self.slots.drain(..).flatten() {
            device.destroy_query_pool(slot.query_pool);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_gfx::headless::{GfxHeadlessDevice, GfxObjectKind};

    #[test]
    fn pools_are_per_slot_and_reused() {
        let mut device = GfxHeadlessDevice::new(2);
        let mut timers = RgGpuTimers::default();

        let pool0 = timers.prepare(&mut device, 0, ["gbuffer", "lighting"].into_iter()).expect("pool");
        let pool1 = timers.prepare(&mut device, 1, ["gbuffer"].into_iter()).expect("pool");
        let pool0_again = timers.prepare(&mut device, 0, ["gbuffer", "lighting", "post"].into_iter()).expect("pool");

        assert_ne!(pool0, pool1);
        assert_eq!(pool0, pool0_again);
        assert_eq!(device.live_count(GfxObjectKind::QueryPool), 2);

        let labels: Vec<_> = timers.timers(0).iter().map(|t| t.label()).collect();
        assert_eq!(labels, vec!["gbuffer", "lighting", "post"]);
        assert_eq!(timers.timers(0)[2].begin_query(), 4);
        assert_eq!(timers.timers(0)[2].end_query(), 5);

        timers.destroy(&mut device);
        assert_eq!(device.live_count(GfxObjectKind::QueryPool), 0);
        assert!(timers.is_empty());
    }

    #[test]
    fn elapsed_time_uses_the_timestamp_period() {
        let mut device = GfxHeadlessDevice::new(1);
        let mut timers = RgGpuTimers::default();
        timers.prepare(&mut device, 0, ["blit"].into_iter()).expect("pool");

        let elapsed = timers.timers(0)[0].elapsed_ms(&device).expect("headless timestamps");
        let expected = GfxHeadlessDevice::TICKS_PER_QUERY as f64 / 1_000_000.0;
        assert!((elapsed - expected).abs() < 1e-9);

        timers.destroy(&mut device);
    }
}
