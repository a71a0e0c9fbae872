pub mod buffers;
pub mod correlate;
pub mod decode;
pub mod fft;
pub mod matcher;
pub mod memory;
pub mod offline;
pub mod peaks;
pub mod resample;
pub mod wav;
