use glam::Vec2;

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Wrapping {
    Repeat,
    #[default]
    ClampToEdge,
    MirroredRepeat,
}

/// Magnification / minification filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    NearestMipmapNearest,
    NearestMipmapLinear,
    #[default]
    Linear,
    LinearMipmapNearest,
    LinearMipmapLinear,
}

impl Filter {
    /// Mipmapped filters fall back to their base filter on textures whose
    /// size is not a power of two.
    #[must_use]
    pub fn without_mipmaps(self) -> Self {
        match self {
            Filter::Nearest | Filter::NearestMipmapNearest | Filter::NearestMipmapLinear => {
                Filter::Nearest
            }
            _ => Filter::Linear,
        }
    }

    #[must_use]
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, Filter::Nearest | Filter::Linear)
    }
}

/// Pixel layout of uploaded image data. Components are unsigned bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    Alpha,
    Rgb,
    #[default]
    Rgba,
    Luminance,
    LuminanceAlpha,
}

impl PixelFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Alpha | PixelFormat::Luminance => 1,
            PixelFormat::LuminanceAlpha => 2,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Decoded image pixels, produced by an external image loader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl ImageData {
    #[must_use]
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    #[must_use]
    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }
}

/// A 2D texture.
///
/// `needs_update` triggers an upload on the next bind; the renderer clears it
/// once the image has been sent to the device.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: String,
    pub image: Option<ImageData>,
    pub wrap_s: Wrapping,
    pub wrap_t: Wrapping,
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub generate_mipmaps: bool,
    pub flip_y: bool,
    pub premultiply_alpha: bool,
    pub offset: Vec2,
    pub repeat: Vec2,
    pub needs_update: bool,
}

impl Default for Texture {
    fn default() -> Self {
        Self {
            name: String::new(),
            image: None,
            wrap_s: Wrapping::ClampToEdge,
            wrap_t: Wrapping::ClampToEdge,
            mag_filter: Filter::Linear,
            min_filter: Filter::LinearMipmapLinear,
            generate_mipmaps: true,
            flip_y: true,
            premultiply_alpha: false,
            offset: Vec2::ZERO,
            repeat: Vec2::ONE,
            needs_update: false,
        }
    }
}

impl Texture {
    #[must_use]
    pub fn new(image: ImageData) -> Self {
        Self {
            image: Some(image),
            needs_update: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Replaces the pixels and schedules a re-upload.
    pub fn set_image(&mut self, image: ImageData) {
        self.image = Some(image);
        self.needs_update = true;
    }
}
