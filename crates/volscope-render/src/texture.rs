//! Texture and sampler creation for volumes, lookup tables and render targets.

use crate::error::{RenderError, RenderResult};

/// Format of single-channel voxel textures.
pub const CHANNEL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
/// Format of fused and combined RGBA volumes.
pub const FUSED_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Format of lookup-table textures and path-trace accumulation targets.
pub const FLOAT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
/// Depth format of render targets.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Checks that a texture row stride is a multiple of the GPU copy alignment.
pub fn check_row_alignment(bytes_per_row: u32) -> RenderResult<()> {
    let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    if bytes_per_row % alignment != 0 {
        return Err(RenderError::UnalignedRowStride {
            bytes_per_row,
            alignment,
        });
    }
    Ok(())
}

/// Rounds a row of `width` texels of `bytes_per_texel` up to the copy alignment.
#[must_use]
pub fn aligned_bytes_per_row(width: u32, bytes_per_texel: u32) -> u32 {
    let unaligned = width * bytes_per_texel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

fn extent_3d([x, y, z]: [u32; 3]) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: x,
        height: y,
        depth_or_array_layers: z,
    }
}

/// Writes tightly packed 3D texel data into `texture`.
pub fn write_volume(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    data: &[u8],
    size: [u32; 3],
    bytes_per_texel: u32,
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(size[0] * bytes_per_texel),
            rows_per_image: Some(size[1]),
        },
        extent_3d(size),
    );
}

/// Creates an immutable `r8unorm` 3D texture of `size = [x, y, z]` and uploads `data`.
pub fn create_channel_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    data: &[u8],
    size: [u32; 3],
    label: &str,
) -> wgpu::Texture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent_3d(size),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D3,
        format: CHANNEL_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write_volume(queue, &texture, data, size, 1);
    texture
}

/// Creates one half of the fused ping-pong pair.
pub fn create_fused_texture(device: &wgpu::Device, size: [u32; 3], label: &str) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent_3d(size),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D3,
        format: FUSED_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

/// Creates the host-packed RGBA volume read by the path tracer.
pub fn create_combined_volume_texture(device: &wgpu::Device, size: [u32; 3]) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Combined Volume Texture"),
        size: extent_3d(size),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D3,
        format: FUSED_FORMAT,
        usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}

/// Creates a `256 x rows` float RGBA lookup-table texture.
pub fn create_lut_texture(device: &wgpu::Device, rows: u32, label: &str) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: volscope_core::LUT_ENTRIES as u32,
            height: rows,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FLOAT_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

/// Creates an `rgba32float` 2D target.
pub fn create_float_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    usage: wgpu::TextureUsages,
    label: &str,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FLOAT_FORMAT,
        usage,
        view_formats: &[],
    })
}

/// Creates a color texture usable as a render attachment and copy source.
pub fn create_color_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Color Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

/// Creates a depth-stencil texture.
pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

/// Clamp-to-edge sampler with linear filtering.
pub fn create_linear_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Linear Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Clamp-to-edge sampler with nearest filtering.
pub fn create_nearest_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Nearest Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_alignment() {
        assert!(check_row_alignment(256).is_ok());
        assert!(check_row_alignment(1024).is_ok());
        match check_row_alignment(100) {
            Err(RenderError::UnalignedRowStride {
                bytes_per_row,
                alignment,
            }) => {
                assert_eq!(bytes_per_row, 100);
                assert_eq!(alignment, 256);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(aligned_bytes_per_row(1, 4), 256);
        assert_eq!(aligned_bytes_per_row(64, 4), 256);
        assert_eq!(aligned_bytes_per_row(65, 4), 512);
        assert_eq!(aligned_bytes_per_row(256, 16), 4096);
    }
}
