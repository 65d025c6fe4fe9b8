pub mod audio_device;
pub mod media_port;
