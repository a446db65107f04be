use js_sys::{Array, Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;

pub mod cluster;
pub mod error;
pub mod foreground;
pub mod mask;
#[cfg(not(target_arch = "wasm32"))]
pub mod output;
pub mod pipeline;
pub mod reconstruct;
pub mod segment;

pub use cluster::{ClusterOptions, Clustering, MAX_COLORS};
pub use error::PosterizeError;
pub use foreground::{BACKGROUND, ForegroundImage, PixelSample};
pub use mask::ChannelMask;
#[cfg(not(target_arch = "wasm32"))]
pub use output::{OutputPlan, WrittenArtifacts};
pub use pipeline::{PosterizeConfig, Posterized, posterize, posterize_bytes};
pub use reconstruct::QuantizedImage;
#[cfg(not(target_arch = "wasm32"))]
pub use segment::CommandSegmenter;
pub use segment::{AlphaMatte, Segmenter};

/// Posterize an already cut-out image (transparent or black background).
///
/// Returns `{ image, palette, masks }`: the quantized image as PNG bytes, the
/// palette as `RRGGBB` hex strings, and one PNG mask per palette entry in the
/// same order as `palette`.
#[wasm_bindgen(js_name = posterize)]
pub fn posterize_js(input: Vec<u8>, n_colors: usize, seed: Option<u64>) -> Result<Object, JsValue> {
    let mut config = PosterizeConfig::default().with_colors(n_colors);
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }

    let result = posterize_bytes(&input, &config).map_err(to_js)?;

    let image_png = result.quantized().encode_png().map_err(to_js)?;

    let palette_js = Array::new();
    for hex in result.palette_hex() {
        palette_js.push(&JsValue::from_str(&hex));
    }

    let masks_js = Array::new();
    for mask in result.masks() {
        let png = mask.encode_png().map_err(to_js)?;
        masks_js.push(&Uint8Array::from(png.as_slice()));
    }

    let out = Object::new();
    Reflect::set(&out, &JsValue::from_str("image"), &Uint8Array::from(image_png.as_slice()))?;
    Reflect::set(&out, &JsValue::from_str("palette"), &palette_js)?;
    Reflect::set(&out, &JsValue::from_str("masks"), &masks_js)?;

    Ok(out)
}

fn to_js(err: PosterizeError) -> JsValue {
    JsValue::from_str(&err.to_string())
}
