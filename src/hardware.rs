use crate::config::Sampling;
use crate::error::{Error, Result};
use core::fmt;
use core::marker::PhantomData;
use embedded_hal::adc::{Channel, OneShot};
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::digital::v2::InputPin;
use embedded_hal::PwmPin;

/// Analog access needed to calibrate one input and one output.
///
/// No unit conversion happens here: samples and drive values are raw.
pub trait AnalogIo {
    /// Returns one oversampled, noise-masked input sample.
    fn sample(&mut self) -> Result<u16>;

    /// Sets the output stage to the raw drive `value`.
    fn drive(&mut self, value: u16);

    /// Largest drive value the output accepts.
    fn max_drive(&self) -> u16;

    /// Blocks for `ms` milliseconds.
    fn settle(&mut self, ms: u16);

    /// Whether the module is powered over USB rather than by the rack.
    fn usb_powered(&mut self) -> bool;
}

/// Hardware context built from `embedded-hal` parts.
///
/// Owns the input channel, the output and everything needed to time them,
/// so the rest of the calibration never touches a global.
#[derive(Debug)]
pub struct Hardware<Adc, ADC, Pin, Pwm, Delay, Sense> {
    adc: Adc,
    pin: Pin,
    output: Pwm,
    delay: Delay,
    usb_sense: Sense,
    sampling: Sampling,
    _adc: PhantomData<ADC>,
}

impl<Adc, ADC, Pin, Pwm, Delay, Sense> Hardware<Adc, ADC, Pin, Pwm, Delay, Sense> {
    pub fn new(
        adc: Adc,
        pin: Pin,
        output: Pwm,
        delay: Delay,
        usb_sense: Sense,
        sampling: Sampling,
    ) -> Self
    where
        Pin: Channel<ADC>,
    {
        debug_assert!(sampling.oversampling > 0, "oversampling must not be zero");

        Self {
            adc,
            pin,
            output,
            delay,
            usb_sense,
            sampling,
            _adc: PhantomData,
        }
    }

    /// Destroys the context and returns its parts.
    pub fn free(self) -> (Adc, Pin, Pwm, Delay, Sense) {
        (self.adc, self.pin, self.output, self.delay, self.usb_sense)
    }
}

impl<Adc, ADC, Pin, Pwm, Delay, Sense> AnalogIo for Hardware<Adc, ADC, Pin, Pwm, Delay, Sense>
where
    Adc: OneShot<ADC, u16, Pin>,
    <Adc as OneShot<ADC, u16, Pin>>::Error: fmt::Debug,
    Pin: Channel<ADC>,
    Pwm: PwmPin<Duty = u16>,
    Delay: DelayMs<u16>,
    Sense: InputPin,
    Sense::Error: fmt::Debug,
{
    fn sample(&mut self) -> Result<u16> {
        let count = u32::from(self.sampling.oversampling.max(1));
        let mut total = 0u32;

        for _ in 0..count {
            let raw = nb::block!(self.adc.read(&mut self.pin)).map_err(|e| {
                log::error!("adc read failed: {:?}", e);
                Error::Sample
            })?;
            total += u32::from(raw & self.sampling.noise_mask);
        }

        // rounded average of values <= u16::MAX
        Ok(((total + count / 2) / count) as u16)
    }

    fn drive(&mut self, value: u16) {
        self.output.set_duty(value);
    }

    fn max_drive(&self) -> u16 {
        self.output.get_max_duty()
    }

    fn settle(&mut self, ms: u16) {
        self.delay.delay_ms(ms);
    }

    fn usb_powered(&mut self) -> bool {
        self.usb_sense.is_high().unwrap_or_else(|e| {
            log::warn!("usb sense unreadable: {:?}", e);
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::{
        adc::{Mock, MockChan0, Transaction},
        delay::MockNoop,
        pin::{Mock as PinMock, State, Transaction as PinTransaction},
        MockError,
    };
    use std::io::ErrorKind;
    use std::vec::Vec;

    #[derive(Debug, Default)]
    struct Output {
        duty: u16,
    }

    impl PwmPin for Output {
        type Duty = u16;

        fn disable(&mut self) {}

        fn enable(&mut self) {}

        fn get_duty(&self) -> u16 {
            self.duty
        }

        fn get_max_duty(&self) -> u16 {
            u16::MAX
        }

        fn set_duty(&mut self, duty: u16) {
            self.duty = duty;
        }
    }

    fn hardware(
        reads: &[Transaction<u16>],
        sense: &[PinTransaction],
        oversampling: u16,
    ) -> impl AnalogIo {
        Hardware::new(
            Mock::new(reads),
            MockChan0 {},
            Output::default(),
            MockNoop::new(),
            PinMock::new(sense),
            Sampling {
                oversampling,
                ..Sampling::default()
            },
        )
    }

    #[test]
    #[should_panic]
    fn panics_without_oversampling() {
        hardware(&[], &[], 0);
    }

    #[test]
    fn masks_noise_bits() {
        let reads = [Transaction::read(0, 0x1234)];
        let mut hw = hardware(&reads, &[], 1);

        assert_eq!(hw.sample(), Ok(0x1200));
    }

    #[test]
    fn averages_and_rounds() {
        let reads = [
            Transaction::read(0, 0x0080),
            Transaction::read(0, 0x0100),
            Transaction::read(0, 0x0100),
            Transaction::read(0, 0x0100),
        ];
        let mut hw = hardware(&reads, &[], 4);

        // (0x80 + 3 * 0x100) / 4 = 224
        assert_eq!(hw.sample(), Ok(224));
    }

    #[test]
    fn oversamples_256_conversions() {
        let reads: Vec<Transaction<u16>> = (0..256)
            .map(|i| Transaction::read(0, if i % 2 == 0 { 26_880 } else { 27_008 }))
            .collect();
        let mut hw = hardware(&reads, &[], 256);

        assert_eq!(hw.sample(), Ok(26_944));
    }

    #[test]
    fn full_scale_does_not_overflow() {
        let reads: Vec<Transaction<u16>> =
            (0..256).map(|_| Transaction::read(0, u16::MAX)).collect();
        let mut hw = hardware(&reads, &[], 256);

        assert_eq!(hw.sample(), Ok(0xff80));
    }

    #[test]
    fn read_error() {
        let reads = [Transaction::read(0, 0).with_error(MockError::Io(ErrorKind::InvalidData))];
        let mut hw = hardware(&reads, &[], 1);

        assert_eq!(hw.sample(), Err(Error::Sample));
    }

    #[test]
    fn drives_output() {
        let mut hw = Hardware::new(
            Mock::<u16>::new(&[]),
            MockChan0 {},
            Output::default(),
            MockNoop::new(),
            PinMock::new(&[]),
            Sampling::default(),
        );

        hw.drive(4200);
        hw.settle(100);

        assert_eq!(hw.max_drive(), u16::MAX);
        let (_, _, output, _, _) = hw.free();
        assert_eq!(output.get_duty(), 4200);
    }

    #[test]
    fn senses_usb_power() {
        let sense = [
            PinTransaction::get(State::High),
            PinTransaction::get(State::Low),
        ];
        let mut hw = hardware(&[], &sense, 1);

        assert!(hw.usb_powered());
        assert!(!hw.usb_powered());
    }
}
