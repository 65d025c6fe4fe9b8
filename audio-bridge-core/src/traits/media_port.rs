use crate::models::error::Result;
use crate::models::format::PortInfo;
use crate::models::frame::AudioFrame;

/// Frame exchange contract between audio producers and consumers.
///
/// Implemented by:
/// - `AdapterFacade` (both sides of an `AdapterPort`)
/// - any mixer-side source or sink a `DevicePort` is connected to
///
/// Methods take `&self` because the two ends of a port are driven from
/// different threads; implementations synchronize internally.
pub trait MediaPort: Send + Sync {
    /// Identity and frame format of this port.
    fn info(&self) -> &PortInfo;

    /// Fill `frame` with the next frame from this port.
    fn get_frame(&self, frame: &mut AudioFrame) -> Result<()>;

    /// Hand one frame to this port. The port copies what it keeps.
    fn put_frame(&self, frame: &AudioFrame) -> Result<()>;

    /// Release the port's resources.
    fn destroy(&self) -> Result<()>;
}
