//! Hardware Resource Management
//!
//! Assigns the RP2350 pins and peripherals to the tasks that own them.
//!
//! # Resource Groups
//! - Reflectance: eight RC reflectance sensor lines, channel 0 leftmost
//! - Range: HC-SR04 trigger and echo
//! - Motors: L298N direction pins and the PWM slice driving both enables
//! - Radio: UART to the transparent serial radio module
//! - Storage: flash and the DMA channel used for async flash access
//! - Steering core: core1, which runs the line following loop on its own

use assign_resources::assign_resources;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::{self, UART0};
use embassy_rp::uart::BufferedInterruptHandler;

assign_resources! {
    reflectance: ReflectanceResources {
        line0: PIN_2,
        line1: PIN_3,
        line2: PIN_4,
        line3: PIN_5,
        line4: PIN_6,
        line5: PIN_7,
        line6: PIN_8,
        line7: PIN_9,
    },
    range: RangeResources {
        trigger_pin: PIN_20,
        echo_pin: PIN_21,
    },
    motors: MotorResources {
        left_forward_pin: PIN_10,
        left_backward_pin: PIN_11,
        right_forward_pin: PIN_12,
        right_backward_pin: PIN_13,
        slice: PWM_SLICE7,
        left_enable_pin: PIN_14,
        right_enable_pin: PIN_15,
    },
    radio: RadioResources {
        uart: UART0,
        tx_pin: PIN_0,
        rx_pin: PIN_1,
    },
    storage: StorageResources {
        flash: FLASH,
        dma: DMA_CH0,
    },
    steering_core: SteeringCoreResources {
        core: CORE1,
    },
}

bind_interrupts!(pub struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});
