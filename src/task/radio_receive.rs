//! Radio Receive Task
//!
//! Reads frames from the radio UART and hands each one to the capture
//! acknowledgement. Link errors are logged and reading continues.

use defmt::{info, warn};
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::BufferedUartRx;
use embassy_time::{Duration, Timer};
use line_robot::control::capture::CAPTURE_ACK;
use line_robot::driver::radio::{FrameReader, LinkError, PeerAddress};

/// Pause after a link error before reading again
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

#[embassy_executor::task]
pub async fn radio_receive(radio_rx: BufferedUartRx<'static, UART0>, local_address: PeerAddress) {
    let mut reader = FrameReader::new(radio_rx, local_address);

    info!("Radio receive started");
    loop {
        match reader.receive().await {
            Ok(frame) => {
                CAPTURE_ACK.on_frame(&frame);
            }
            Err(LinkError::Closed) => {
                warn!("Radio stream ended");
                Timer::after(ERROR_BACKOFF).await;
            }
            Err(LinkError::Io(e)) => {
                warn!("Radio read error: {:?}", e);
                Timer::after(ERROR_BACKOFF).await;
            }
        }
    }
}
