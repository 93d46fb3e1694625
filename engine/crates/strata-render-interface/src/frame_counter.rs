pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
    fif_count: usize,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64, fif_count: usize) -> Self {
        assert!(fif_count > 0, "frames in flight must be at least 1");
        Self {
            frame_id: init_frame_id,
            fif_count,
        }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub fn fif_count(&self) -> usize {
        self.fif_count
    }
    /// 当前帧使用的 frame-in-flight 槽位
    #[inline]
    pub fn fif_index(&self) -> usize {
        (self.frame_id % self.fif_count as u64) as usize
    }
    /// 槽位的字母标记：A, B, C...
    #[inline]
    pub fn frame_label(&self) -> char {
        (b'A' + (self.fif_index() % 26) as u8) as char
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
    /// 资源在引用计数归零之后需要等待的帧数
    #[inline]
    pub fn destroy_delay(&self) -> usize {
        self.fif_count + 1
    }
}
