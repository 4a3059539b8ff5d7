// THEORY:
// The `Pixel` module is the most fundamental unit of the engine. It is a "dumb"
// data container for a single 16-bit RGB sample plus the handful of single-pair
// heuristics the rest of the engine needs.
//
// Key principles:
// 1) Timelapse frames are decoded as 16 bits per channel with no alpha. Keeping the
//    full range matters: the outlier threshold (8500 by default) lives on that scale.
// 2) Brightness distance is one-sided. An airplane adds light to the sky, so only the
//    amount by which this pixel is *brighter* than its neighbor counts. A pixel that
//    got darker is never an outlier.
// 3) Reconstruction under a painted streak takes the per-channel minimum of the
//    neighbor samples, i.e. the darkest value any clean neighbor saw.

pub mod pixel {
    pub type Channel = u16;
    pub type Distance = u32;

    const CHANNELS: usize = 3;

    /// A single RGB pixel, 16 bits per channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
    }

    impl Pixel {
        pub const BLACK: Pixel = Pixel::new(0, 0, 0);

        pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        /// Mean per-channel brightening of `self` over `other`, clamped at zero.
        pub fn brightness_distance(&self, other: &Pixel) -> Distance {
            let red = self.red as i32 - other.red as i32;
            let green = self.green as i32 - other.green as i32;
            let blue = self.blue as i32 - other.blue as i32;
            let mean = (red + green + blue) / CHANNELS as i32;
            mean.max(0) as Distance
        }

        /// Per-channel minimum of two pixels.
        pub fn channel_min(&self, other: &Pixel) -> Pixel {
            Pixel { red: self.red.min(other.red), green: self.green.min(other.green), blue: self.blue.min(other.blue) }
        }

        pub fn channels(&self) -> [Channel; CHANNELS] {
            [self.red, self.green, self.blue]
        }
    }

    impl From<[Channel; CHANNELS]> for Pixel {
        fn from(channels: [Channel; CHANNELS]) -> Self {
            Pixel::new(channels[0], channels[1], channels[2])
        }
    }

    impl From<Pixel> for [Channel; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            pixel.channels()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn distance_counts_only_brightening() {
            let sky = Pixel::new(1000, 1200, 1400);
            let trail = Pixel::new(31000, 31200, 31400);
            assert_eq!(trail.brightness_distance(&sky), 30000);
            assert_eq!(sky.brightness_distance(&trail), 0);
        }

        #[test]
        fn distance_averages_channels() {
            let a = Pixel::new(300, 0, 0);
            assert_eq!(a.brightness_distance(&Pixel::BLACK), 100);
        }

        #[test]
        fn channel_min_picks_darkest_per_channel() {
            let a = Pixel::new(10, 500, 30);
            let b = Pixel::new(20, 400, 30);
            assert_eq!(a.channel_min(&b), Pixel::new(10, 400, 30));
        }
    }
}
