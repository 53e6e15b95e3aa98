//! Marginalia Render Library
//!
//! Screen-space ink overlay, CPU rasterization and composite export of
//! attempts onto rendered document pages.

pub mod document;
pub mod export;
pub mod frame;
pub mod overlay;
pub mod raster;

pub use document::{DocumentRenderer, ImageDocument, RenderError, RenderResult};
pub use export::{
    CompositeExporter, ExportError, ExportRequest, ExportedImage, PagePlacement, encode, locate_page, page_layout,
};
pub use frame::{FrameScheduler, FrameTicket};
pub use overlay::{CardLabel, InkOverlay, MountProps, OverlayStyle};
