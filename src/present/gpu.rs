// Hardware quad backend seam.
//
// The platform owns context creation (EGL or equivalent); the crate owns
// everything above it: the shader pair, the full-screen quad, the texture
// sizing policy, and the per-frame upload/draw/swap ordering driven by the
// presenter. Implementations are expected to configure an ES-2-class context
// on the session surface with 8-bit RGB plus 8-bit alpha and swap interval 0.

use super::PresentError;

/// Pass-through vertex shader for the full-screen quad.
pub const VERTEX_SHADER: &str = "\
attribute vec4 a_position;
attribute vec2 a_texcoord;
varying vec2 v_texcoord;
void main() {
    gl_Position = a_position;
    v_texcoord = a_texcoord;
}
";

/// Fragment shader sampling the single-channel luminance texture and
/// broadcasting it to an opaque grey pixel.
pub const FRAGMENT_SHADER: &str = "\
precision mediump float;
varying vec2 v_texcoord;
uniform sampler2D u_texture;
void main() {
    float grey = texture2D(u_texture, v_texcoord).r;
    gl_FragColor = vec4(grey, grey, grey, 1.0);
}
";

/// Interleaved `x, y, u, v` for the two triangles of a full-screen quad,
/// flipped vertically so texture row 0 lands at the top of the surface.
pub const QUAD_VERTICES: [f32; 24] = [
    -1.0, -1.0, 0.0, 1.0, //
    1.0, -1.0, 1.0, 1.0, //
    -1.0, 1.0, 0.0, 0.0, //
    -1.0, 1.0, 0.0, 0.0, //
    1.0, -1.0, 1.0, 1.0, //
    1.0, 1.0, 1.0, 0.0, //
];

/// Vertices drawn per frame.
pub const QUAD_VERTEX_COUNT: usize = 6;

/// One live hardware context on the session surface.
///
/// Calls arrive from the presenter thread only, in the fixed order
/// `ensure_texture`, `upload_and_draw`, `swap` per frame. Any error tears the
/// backend down for the rest of the session; implementations do not need to
/// recover internally.
pub trait QuadContext: Send {
    /// Make the luminance texture match `width x height`, recreating it if
    /// the dimensions changed. Linear filtering, clamp to edge, unpack
    /// alignment 1.
    fn ensure_texture(&mut self, width: u32, height: u32) -> Result<(), PresentError>;

    /// Upload `width * height` grey bytes as a sub-image update and draw the
    /// quad.
    fn upload_and_draw(&mut self, grey: &[u8], width: u32, height: u32)
    -> Result<(), PresentError>;

    /// Present the back buffer.
    fn swap(&mut self) -> Result<(), PresentError>;
}

/// Creates a `QuadContext` on the session surface on first use.
///
/// The factory runs on the presenter thread, where the context must live for
/// its whole life; contexts are thread-affine on every platform this targets.
pub trait QuadContextFactory: Send {
    fn create(&mut self, width: u32, height: u32) -> Result<Box<dyn QuadContext>, PresentError>;
}
