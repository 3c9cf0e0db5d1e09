use crate::windowing::WindowLevel;

/// Named window/level settings for common CT tissue types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    SoftTissue,
    Lung,
    Bone,
    Brain,
    Abdomen,
    Liver,
    Mediastinum,
    Spine,
    Pelvis,
    HeadNeck,
    CtaVascular,
    Kidney,
    Pancreas,
    Trauma,
    Subdural,
    Stroke,
    Body,
    ExtremityMsk,
    TemporalBone,
    Sinus,
    AngioBoneSub,
    LungHrct,
    Orbits,
    CtaHeadNeck,
    Arterial,
    Venous,
    ColonBowel,
    Adrenal,
    Gallbladder,
    SkinSubcutaneous,
    Cardiac,
}

impl Preset {
    pub const ALL: [Preset; 31] = [
        Preset::SoftTissue,
        Preset::Lung,
        Preset::Bone,
        Preset::Brain,
        Preset::Abdomen,
        Preset::Liver,
        Preset::Mediastinum,
        Preset::Spine,
        Preset::Pelvis,
        Preset::HeadNeck,
        Preset::CtaVascular,
        Preset::Kidney,
        Preset::Pancreas,
        Preset::Trauma,
        Preset::Subdural,
        Preset::Stroke,
        Preset::Body,
        Preset::ExtremityMsk,
        Preset::TemporalBone,
        Preset::Sinus,
        Preset::AngioBoneSub,
        Preset::LungHrct,
        Preset::Orbits,
        Preset::CtaHeadNeck,
        Preset::Arterial,
        Preset::Venous,
        Preset::ColonBowel,
        Preset::Adrenal,
        Preset::Gallbladder,
        Preset::SkinSubcutaneous,
        Preset::Cardiac,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::SoftTissue => "Soft Tissue",
            Preset::Lung => "Lung",
            Preset::Bone => "Bone",
            Preset::Brain => "Brain",
            Preset::Abdomen => "Abdomen",
            Preset::Liver => "Liver",
            Preset::Mediastinum => "Mediastinum",
            Preset::Spine => "Spine",
            Preset::Pelvis => "Pelvis",
            Preset::HeadNeck => "Head/Neck",
            Preset::CtaVascular => "CTA/Vascular",
            Preset::Kidney => "Kidney",
            Preset::Pancreas => "Pancreas",
            Preset::Trauma => "Trauma",
            Preset::Subdural => "Subdural",
            Preset::Stroke => "Stroke",
            Preset::Body => "Body",
            Preset::ExtremityMsk => "Extremity/MSK",
            Preset::TemporalBone => "Temporal Bone",
            Preset::Sinus => "Sinus",
            Preset::AngioBoneSub => "Angio Bone Sub",
            Preset::LungHrct => "Lung HRCT",
            Preset::Orbits => "Orbits",
            Preset::CtaHeadNeck => "CTA Head/Neck",
            Preset::Arterial => "Arterial",
            Preset::Venous => "Venous",
            Preset::ColonBowel => "Colon/Bowel",
            Preset::Adrenal => "Adrenal",
            Preset::Gallbladder => "Gallbladder",
            Preset::SkinSubcutaneous => "Skin/Subcutaneous",
            Preset::Cardiac => "Cardiac",
        }
    }

    /// `(center, width)` in Hounsfield units.
    pub fn center_width(self) -> (f32, f32) {
        match self {
            Preset::SoftTissue => (40.0, 400.0),
            Preset::Lung => (-600.0, 1500.0),
            Preset::Bone => (300.0, 1500.0),
            Preset::Brain => (40.0, 80.0),
            Preset::Abdomen => (50.0, 400.0),
            Preset::Liver => (60.0, 150.0),
            Preset::Mediastinum => (40.0, 350.0),
            Preset::Spine => (30.0, 300.0),
            Preset::Pelvis => (50.0, 450.0),
            Preset::HeadNeck => (50.0, 250.0),
            Preset::CtaVascular => (150.0, 600.0),
            Preset::Kidney => (30.0, 300.0),
            Preset::Pancreas => (50.0, 200.0),
            Preset::Trauma => (50.0, 500.0),
            Preset::Subdural => (50.0, 130.0),
            Preset::Stroke => (35.0, 30.0),
            Preset::Body => (40.0, 450.0),
            Preset::ExtremityMsk => (40.0, 350.0),
            Preset::TemporalBone => (700.0, 4000.0),
            Preset::Sinus => (50.0, 300.0),
            Preset::AngioBoneSub => (300.0, 1200.0),
            Preset::LungHrct => (-700.0, 1200.0),
            Preset::Orbits => (50.0, 300.0),
            Preset::CtaHeadNeck => (180.0, 700.0),
            Preset::Arterial => (150.0, 600.0),
            Preset::Venous => (100.0, 500.0),
            Preset::ColonBowel => (50.0, 400.0),
            Preset::Adrenal => (40.0, 300.0),
            Preset::Gallbladder => (30.0, 200.0),
            Preset::SkinSubcutaneous => (50.0, 250.0),
            Preset::Cardiac => (75.0, 350.0),
        }
    }

    pub fn window(self) -> WindowLevel {
        let (center, width) = self.center_width();
        WindowLevel::new(center, width)
    }

    pub fn description(self) -> &'static str {
        match self {
            Preset::SoftTissue => "Good for most organs and muscles.",
            Preset::Lung => "Best for seeing lungs and airways.",
            Preset::Bone => "Makes bones and fractures easy to see.",
            Preset::Brain => "Standard view for brain tissue.",
            Preset::Abdomen => "General view for belly organs.",
            Preset::Liver => "Clearer view of the liver.",
            Preset::Mediastinum => "Shows the middle chest area.",
            Preset::Spine => "Helps check the spine and canal.",
            Preset::Pelvis => "General view of pelvic organs.",
            Preset::HeadNeck => "Shows soft tissues in head/neck.",
            Preset::CtaVascular => "Shows blood vessels with contrast.",
            Preset::Kidney => "Helps see kidneys clearly.",
            Preset::Pancreas => "Better view of the pancreas.",
            Preset::Trauma => "Wide view for injuries.",
            Preset::Subdural => "Helps see bleeding under the skull.",
            Preset::Stroke => "Narrow brain view for early stroke.",
            Preset::Body => "Wide soft-tissue view for whole body.",
            Preset::ExtremityMsk => "For arms/legs soft tissues.",
            Preset::TemporalBone => "Very wide view for ear bones.",
            Preset::Sinus => "For sinuses around the nose.",
            Preset::AngioBoneSub => "Shows vessels after bone is removed.",
            Preset::LungHrct => "Extra detail for lungs.",
            Preset::Orbits => "For the eye sockets.",
            Preset::CtaHeadNeck => "Vessels in head and neck.",
            Preset::Arterial => "Artery phase vessels.",
            Preset::Venous => "Vein phase vessels.",
            Preset::ColonBowel => "For colon and bowel walls.",
            Preset::Adrenal => "For adrenal glands.",
            Preset::Gallbladder => "For gallbladder and bile ducts.",
            Preset::SkinSubcutaneous => "For skin and fat layer.",
            Preset::Cardiac => "For heart soft tissues.",
        }
    }

    /// Case-insensitive lookup; spaces, `/` and `-` are ignored.
    pub fn from_name(value: &str) -> Option<Preset> {
        let wanted = normalize_name(value);
        if wanted.is_empty() {
            return None;
        }
        Preset::ALL
            .into_iter()
            .find(|preset| normalize_name(preset.name()) == wanted)
    }
}

fn normalize_name(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
