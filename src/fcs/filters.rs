use crate::algorithm::filter::{notch_q, Biquad, Denoise, Filter, Pt1};
use crate::config::{DtermFilterType, PidProfile};

/// Concrete filters for each signal path, rebuilt on configuration change.
/// D-term paths exist per axis; yaw entries stay `Pass` unless the tri-mixer
/// topology gives yaw a derivative term.
#[derive(Copy, Clone, Debug, Default)]
pub struct FilterBank {
    pub dterm_notch: [Filter; 3],
    pub dterm_lpf: [Filter; 3],
    pub yaw_lpf: Filter,
}

impl FilterBank {
    pub fn new(profile: &PidProfile, looptime_us: u32, tri_mixer: bool) -> Self {
        let sample_rate = 1_000_000.0 / looptime_us as f32;
        let nyquist = sample_rate / 2.0;
        let dt = looptime_us as f32 * 0.000_001;
        let config = &profile.filters;
        let dterm_axes = if tri_mixer { 3 } else { 2 };

        let mut bank = Self::default();

        if achievable(config.dterm_notch_hz, nyquist) {
            // Q is only positive for a cutoff strictly below the center
            if config.dterm_notch_cutoff < config.dterm_notch_hz {
                let q = notch_q(config.dterm_notch_hz as f32, config.dterm_notch_cutoff as f32);
                let notch =
                    Filter::Biquad(Biquad::notch(config.dterm_notch_hz as f32, sample_rate, q));
                for filter in bank.dterm_notch.iter_mut().take(dterm_axes) {
                    *filter = notch;
                }
            } else {
                debug!(
                    "notch cutoff {}Hz not below center {}Hz, passthrough",
                    config.dterm_notch_cutoff, config.dterm_notch_hz
                );
            }
        }

        if achievable(config.dterm_lpf_hz, nyquist) {
            let cutoff = config.dterm_lpf_hz as f32;
            let lpf = match config.dterm_filter_type {
                DtermFilterType::Pt1 => Filter::Pt1(Pt1::new(cutoff, dt)),
                DtermFilterType::Biquad => Filter::Biquad(Biquad::lowpass(cutoff, sample_rate)),
                DtermFilterType::Denoise => Filter::Denoise(Denoise::new(cutoff, sample_rate)),
            };
            for filter in bank.dterm_lpf.iter_mut().take(dterm_axes) {
                *filter = lpf;
            }
        }

        if achievable(config.yaw_lpf_hz, nyquist) {
            bank.yaw_lpf = Filter::Pt1(Pt1::new(config.yaw_lpf_hz as f32, dt));
        }

        bank
    }
}

/// Zero disables a path; a cutoff at or above Nyquist cannot be realized at
/// this sample rate and silently degrades to passthrough.
fn achievable(cutoff_hz: u16, nyquist: f32) -> bool {
    if cutoff_hz == 0 {
        return false;
    }
    if cutoff_hz as f32 >= nyquist {
        debug!("filter cutoff {}Hz at or above nyquist {}Hz, passthrough", cutoff_hz, nyquist);
        return false;
    }
    true
}

mod test {
    #[cfg(test)]
    fn profile(notch: u16, lpf: u16, yaw: u16) -> crate::config::PidProfile {
        let mut profile = crate::config::PidProfile::default();
        profile.filters.dterm_notch_hz = notch;
        profile.filters.dterm_lpf_hz = lpf;
        profile.filters.yaw_lpf_hz = yaw;
        profile
    }

    #[test]
    fn test_nyquist_boundary() {
        use super::FilterBank;

        // 1kHz loop, nyquist 500Hz: exactly at the limit degrades to
        // passthrough, one below instantiates the real filter
        let bank = FilterBank::new(&profile(500, 500, 500), 1000, false);
        assert!(bank.dterm_notch[0].is_pass());
        assert!(bank.dterm_lpf[0].is_pass());
        assert!(bank.yaw_lpf.is_pass());

        let bank = FilterBank::new(&profile(499, 499, 499), 1000, false);
        assert!(!bank.dterm_notch[0].is_pass());
        assert!(!bank.dterm_lpf[0].is_pass());
        assert!(!bank.yaw_lpf.is_pass());
    }

    #[test]
    fn test_zero_cutoff_disables() {
        use super::FilterBank;

        let bank = FilterBank::new(&profile(0, 0, 0), 1000, false);
        assert!(bank.dterm_notch[0].is_pass());
        assert!(bank.dterm_lpf[1].is_pass());
        assert!(bank.yaw_lpf.is_pass());
    }

    #[test]
    fn test_notch_cutoff_must_be_below_center() {
        use super::FilterBank;

        let mut config = profile(260, 0, 0);
        for cutoff in [260, 300] {
            config.filters.dterm_notch_cutoff = cutoff;
            let bank = FilterBank::new(&config, 1000, false);
            assert!(bank.dterm_notch[0].is_pass());
            assert!(bank.dterm_notch[1].is_pass());
        }

        config.filters.dterm_notch_cutoff = 160;
        assert!(!FilterBank::new(&config, 1000, false).dterm_notch[0].is_pass());
    }

    #[test]
    fn test_dterm_type_selection() {
        use super::FilterBank;
        use crate::algorithm::filter::Filter;
        use crate::config::DtermFilterType;

        let mut config = profile(0, 100, 0);
        let cases: [(DtermFilterType, fn(&Filter) -> bool); 3] = [
            (DtermFilterType::Pt1, |f| matches!(f, Filter::Pt1(_))),
            (DtermFilterType::Biquad, |f| matches!(f, Filter::Biquad(_))),
            (DtermFilterType::Denoise, |f| matches!(f, Filter::Denoise(_))),
        ];
        for (filter_type, expected) in cases {
            config.filters.dterm_filter_type = filter_type;
            let bank = FilterBank::new(&config, 1000, false);
            assert!(expected(&bank.dterm_lpf[0]));
            assert!(expected(&bank.dterm_lpf[1]));
        }
    }

    #[test]
    fn test_yaw_dterm_filters_follow_tri_mixer() {
        use super::FilterBank;

        let bank = FilterBank::new(&profile(260, 100, 0), 1000, false);
        assert!(!bank.dterm_notch[1].is_pass());
        assert!(bank.dterm_notch[2].is_pass());
        assert!(bank.dterm_lpf[2].is_pass());

        let bank = FilterBank::new(&profile(260, 100, 0), 1000, true);
        assert!(!bank.dterm_notch[2].is_pass());
        assert!(!bank.dterm_lpf[2].is_pass());
    }
}
