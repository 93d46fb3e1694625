/// debug label 使用的颜色
pub struct LabelColor;
impl LabelColor {
    const BLUE: glam::Vec4 = glam::vec4(0.0, 0.0, 1.0, 1.0);
    const CYAN: glam::Vec4 = glam::vec4(0.0, 1.0, 1.0, 1.0);
    const MAGENTA: glam::Vec4 = glam::vec4(1.0, 0.0, 1.0, 1.0);

    pub const COLOR_PASS: glam::Vec4 = Self::BLUE;
    pub const COLOR_COMPUTE_PASS: glam::Vec4 = Self::CYAN;
    pub const COLOR_TRANSFER_PASS: glam::Vec4 = Self::MAGENTA;
}
