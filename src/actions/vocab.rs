//! The fixed 480-action vocabulary.
//!
//! Index semantics are frozen: agents address actions by position in a
//! length-480 mask, so every index decodes to exactly one `ActionKind`
//! at compile time. Parameters that fit in the index (hand slots,
//! battlefield slots, relative target indices) are decoded here; the
//! rest arrive through the typed `ActionContext`.

use serde::{Deserialize, Serialize};

/// Size of the action space.
pub const ACTION_SPACE: usize = 480;

// Zone exposure caps for action mapping.
pub const HAND_LAND_SLOTS: usize = 7;
pub const HAND_SLOTS: usize = 8;
pub const BATTLEFIELD_SLOTS: usize = 20;
pub const GRAVEYARD_SLOTS: usize = 6;
pub const EXILE_SLOTS: usize = 8;
pub const ABILITY_SLOTS: usize = 3;

/// The nineteen keyworded alternative-cast mechanics at 205–223.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AltMechanic {
    Disturb,
    Dash,
    Spectacle,
    Bestow,
    Blitz,
    Eternalize,
    Embalm,
    Reinforce,
    Channel,
    Transmute,
    Forecast,
    Suspend,
    Unearth,
    Encore,
    Partner,
    Companion,
    Evoke,
    Miracle,
    Foretell,
}

impl AltMechanic {
    pub const ALL: [AltMechanic; 19] = [
        AltMechanic::Disturb,
        AltMechanic::Dash,
        AltMechanic::Spectacle,
        AltMechanic::Bestow,
        AltMechanic::Blitz,
        AltMechanic::Eternalize,
        AltMechanic::Embalm,
        AltMechanic::Reinforce,
        AltMechanic::Channel,
        AltMechanic::Transmute,
        AltMechanic::Forecast,
        AltMechanic::Suspend,
        AltMechanic::Unearth,
        AltMechanic::Encore,
        AltMechanic::Partner,
        AltMechanic::Companion,
        AltMechanic::Evoke,
        AltMechanic::Miracle,
        AltMechanic::Foretell,
    ];
}

/// Graveyard-zone alternative casts at 398–404.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraveCast {
    Flashback,
    JumpStart,
    Escape,
    Madness,
    Overload,
    Emerge,
    Delve,
}

impl GraveCast {
    pub const ALL: [GraveCast; 7] = [
        GraveCast::Flashback,
        GraveCast::JumpStart,
        GraveCast::Escape,
        GraveCast::Madness,
        GraveCast::Overload,
        GraveCast::Emerge,
        GraveCast::Delve,
    ];
}

/// Library search categories at 299–303.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchCategory {
    BasicLand,
    Creature,
    Instant,
    Sorcery,
    Artifact,
}

impl SearchCategory {
    pub const ALL: [SearchCategory; 5] = [
        SearchCategory::BasicLand,
        SearchCategory::Creature,
        SearchCategory::Instant,
        SearchCategory::Sorcery,
        SearchCategory::Artifact,
    ];
}

/// Battlefield mechanic actions at 418–429.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MechanicAction {
    Investigate,
    Foretell,
    Amass,
    Learn,
    Venture,
    Exert,
    Explore,
    Adapt,
    Mutate,
    Cycling,
    Goad,
    Boast,
}

impl MechanicAction {
    pub const ALL: [MechanicAction; 12] = [
        MechanicAction::Investigate,
        MechanicAction::Foretell,
        MechanicAction::Amass,
        MechanicAction::Learn,
        MechanicAction::Venture,
        MechanicAction::Exert,
        MechanicAction::Explore,
        MechanicAction::Adapt,
        MechanicAction::Mutate,
        MechanicAction::Cycling,
        MechanicAction::Goad,
        MechanicAction::Boast,
    ];
}

/// Response actions at 430–434.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseAction {
    CounterSpell,
    CounterAbility,
    PreventDamage,
    RedirectDamage,
    Stifle,
}

impl ResponseAction {
    pub const ALL: [ResponseAction; 5] = [
        ResponseAction::CounterSpell,
        ResponseAction::CounterAbility,
        ResponseAction::PreventDamage,
        ResponseAction::RedirectDamage,
        ResponseAction::Stifle,
    ];
}

/// Combat sub-actions at 435–444.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatSubAction {
    FirstStrikeOrder,
    AssignCombatDamage,
    Ninjutsu,
    DeclareAttackersDone,
    DeclareBlockersDone,
    LoyaltyPlus,
    LoyaltyMinus,
    LoyaltyZero,
    LoyaltyUltimate,
    ProtectPlaneswalker,
}

impl CombatSubAction {
    pub const ALL: [CombatSubAction; 10] = [
        CombatSubAction::FirstStrikeOrder,
        CombatSubAction::AssignCombatDamage,
        CombatSubAction::Ninjutsu,
        CombatSubAction::DeclareAttackersDone,
        CombatSubAction::DeclareBlockersDone,
        CombatSubAction::LoyaltyPlus,
        CombatSubAction::LoyaltyMinus,
        CombatSubAction::LoyaltyZero,
        CombatSubAction::LoyaltyUltimate,
        CombatSubAction::ProtectPlaneswalker,
    ];
}

/// A decoded action. One variant per vocabulary category; index-borne
/// parameters are decoded into the variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    EndTurn,
    UntapNext,
    DrawNext,
    MainPhaseEnd,
    NoOp,
    Mulligan,
    UpkeepPass,
    BeginCombatEnd,
    EndCombat,
    EndStep,
    PassPriority,
    Concede,
    PlayLand { hand_idx: usize },
    PlaySpell { hand_idx: usize },
    Attack { battlefield_idx: usize },
    Block { battlefield_idx: usize },
    TapLandForMana { battlefield_idx: usize },
    TapLandForEffect { battlefield_idx: usize },
    ActivateAbility { battlefield_idx: usize, ability_idx: u8 },
    Transform { battlefield_idx: usize },
    PlayMdfcLandBack { hand_idx: usize },
    PlayMdfcBack { hand_idx: usize },
    PlayAdventure { hand_idx: usize },
    DefendBattle,
    AltCast(AltMechanic),
    KeepHand,
    BottomCard { hand_idx: usize },
    CastFromExile { exile_idx: usize },
    DiscardCard { hand_idx: usize },
    UnlockDoor { battlefield_idx: usize },
    LevelUpClass { battlefield_idx: usize },
    SelectSpreeMode { hand_idx: usize, mode_idx: u8 },
    SelectTarget { choice_idx: usize },
    SacrificePermanent { choice_idx: usize },
    CastForImpending,
    PayOffspringCost,
    SearchLibrary(SearchCategory),
    NoOpSearchFail,
    PutToGraveyard,
    PutOnTop,
    PutOnBottom,
    Dredge,
    AddCounter { target_idx: usize },
    RemoveCounter { target_idx: usize },
    Proliferate,
    ReturnFromGraveyard { graveyard_idx: usize },
    Reanimate { graveyard_idx: usize },
    ReturnFromExile { exile_idx: usize },
    ChooseMode { mode_idx: u8 },
    ChooseX { x: u32 },
    ChooseColor { color_idx: usize },
    AttackPlaneswalker { rel_idx: usize },
    AssignMultipleBlockers { attacker_idx: usize },
    GraveCast(GraveCast),
    PayKicker { pay: bool },
    PayAdditional { pay: bool },
    PayEscalate,
    CreateToken { token_idx: usize },
    CopyPermanent,
    CopySpell,
    Populate,
    Mechanic(MechanicAction),
    Response(ResponseAction),
    CombatSub(CombatSubAction),
    CastLeftHalf,
    CastRightHalf,
    CastFuse,
    AftermathCast,
    FlipCard,
    Equip,
    Fortify,
    Reconfigure,
    Morph,
    Manifest,
    Clash,
    Conspire,
    Grandeur,
    AttackBattle { rel_idx: usize },
}

impl ActionKind {
    /// Decode an action index. `None` only for indices outside the
    /// vocabulary; reserved indices decode to `NoOp`.
    #[must_use]
    pub fn decode(index: u16) -> Option<ActionKind> {
        let i = index as usize;
        Some(match i {
            0 => ActionKind::EndTurn,
            1 => ActionKind::UntapNext,
            2 => ActionKind::DrawNext,
            3 => ActionKind::MainPhaseEnd,
            4 | 5 => ActionKind::NoOp,
            6 => ActionKind::Mulligan,
            7 => ActionKind::UpkeepPass,
            8 => ActionKind::BeginCombatEnd,
            9 => ActionKind::EndCombat,
            10 => ActionKind::EndStep,
            11 => ActionKind::PassPriority,
            12 => ActionKind::Concede,
            13..=19 => ActionKind::PlayLand { hand_idx: i - 13 },
            20..=27 => ActionKind::PlaySpell { hand_idx: i - 20 },
            28..=47 => ActionKind::Attack {
                battlefield_idx: i - 28,
            },
            48..=67 => ActionKind::Block {
                battlefield_idx: i - 48,
            },
            68..=87 => ActionKind::TapLandForMana {
                battlefield_idx: i - 68,
            },
            88..=99 => ActionKind::TapLandForEffect {
                battlefield_idx: i - 88,
            },
            100..=159 => ActionKind::ActivateAbility {
                battlefield_idx: (i - 100) / ABILITY_SLOTS,
                ability_idx: ((i - 100) % ABILITY_SLOTS) as u8,
            },
            160..=179 => ActionKind::Transform {
                battlefield_idx: i - 160,
            },
            180..=187 => ActionKind::PlayMdfcLandBack { hand_idx: i - 180 },
            188..=195 => ActionKind::PlayMdfcBack { hand_idx: i - 188 },
            196..=203 => ActionKind::PlayAdventure { hand_idx: i - 196 },
            204 => ActionKind::DefendBattle,
            205..=223 => ActionKind::AltCast(AltMechanic::ALL[i - 205]),
            224 => ActionKind::NoOp,
            225 => ActionKind::KeepHand,
            226..=229 => ActionKind::BottomCard { hand_idx: i - 226 },
            230..=237 => ActionKind::CastFromExile { exile_idx: i - 230 },
            238..=247 => ActionKind::DiscardCard { hand_idx: i - 238 },
            248..=252 => ActionKind::UnlockDoor {
                battlefield_idx: i - 248,
            },
            253..=257 => ActionKind::LevelUpClass {
                battlefield_idx: i - 253,
            },
            258..=273 => ActionKind::SelectSpreeMode {
                hand_idx: (i - 258) / 2,
                mode_idx: ((i - 258) % 2) as u8,
            },
            274..=283 => ActionKind::SelectTarget { choice_idx: i - 274 },
            284..=293 => ActionKind::SacrificePermanent { choice_idx: i - 284 },
            294 => ActionKind::CastForImpending,
            295 => ActionKind::PayOffspringCost,
            296..=298 => ActionKind::NoOp,
            299..=303 => ActionKind::SearchLibrary(SearchCategory::ALL[i - 299]),
            304 => ActionKind::NoOpSearchFail,
            305 => ActionKind::PutToGraveyard,
            306 => ActionKind::PutOnTop,
            307 => ActionKind::PutOnBottom,
            308 => ActionKind::Dredge,
            309..=313 => ActionKind::NoOp,
            314..=323 => ActionKind::AddCounter { target_idx: i - 314 },
            324..=333 => ActionKind::RemoveCounter { target_idx: i - 324 },
            334 => ActionKind::Proliferate,
            335..=340 => ActionKind::ReturnFromGraveyard {
                graveyard_idx: i - 335,
            },
            341..=346 => ActionKind::Reanimate {
                graveyard_idx: i - 341,
            },
            347..=352 => ActionKind::ReturnFromExile { exile_idx: i - 347 },
            353..=362 => ActionKind::ChooseMode {
                mode_idx: (i - 353) as u8,
            },
            363..=372 => ActionKind::ChooseX {
                x: (i - 363 + 1) as u32,
            },
            373..=377 => ActionKind::ChooseColor { color_idx: i - 373 },
            378..=382 => ActionKind::AttackPlaneswalker { rel_idx: i - 378 },
            383..=392 => ActionKind::AssignMultipleBlockers {
                attacker_idx: i - 383,
            },
            393..=397 => ActionKind::NoOp,
            398..=404 => ActionKind::GraveCast(GraveCast::ALL[i - 398]),
            405 => ActionKind::PayKicker { pay: true },
            406 => ActionKind::PayKicker { pay: false },
            407 => ActionKind::PayAdditional { pay: true },
            408 => ActionKind::PayAdditional { pay: false },
            409 => ActionKind::PayEscalate,
            410..=414 => ActionKind::CreateToken { token_idx: i - 410 },
            415 => ActionKind::CopyPermanent,
            416 => ActionKind::CopySpell,
            417 => ActionKind::Populate,
            418..=429 => ActionKind::Mechanic(MechanicAction::ALL[i - 418]),
            430..=434 => ActionKind::Response(ResponseAction::ALL[i - 430]),
            435..=444 => ActionKind::CombatSub(CombatSubAction::ALL[i - 435]),
            445 => ActionKind::CastLeftHalf,
            446 => ActionKind::CastRightHalf,
            447 => ActionKind::CastFuse,
            448 => ActionKind::AftermathCast,
            449 => ActionKind::FlipCard,
            450 => ActionKind::Equip,
            451 | 452 => ActionKind::NoOp,
            453 => ActionKind::Fortify,
            454 => ActionKind::Reconfigure,
            455 => ActionKind::Morph,
            456 => ActionKind::Manifest,
            457 => ActionKind::Clash,
            458 => ActionKind::Conspire,
            459 => ActionKind::NoOp,
            460 => ActionKind::Grandeur,
            461 => ActionKind::NoOp,
            462..=466 => ActionKind::AttackBattle { rel_idx: i - 462 },
            467..=479 => ActionKind::NoOp,
            _ => return None,
        })
    }
}

// Fixed single-index actions referenced by name elsewhere.
pub const A_END_TURN: u16 = 0;
pub const A_NO_OP: u16 = 4;
pub const A_MULLIGAN: u16 = 6;
pub const A_PASS_PRIORITY: u16 = 11;
pub const A_CONCEDE: u16 = 12;
pub const A_KEEP_HAND: u16 = 225;
pub const A_BOTTOM_BASE: u16 = 226;
pub const A_CAST_FROM_EXILE_BASE: u16 = 230;
pub const A_DISCARD_BASE: u16 = 238;
pub const A_SELECT_TARGET_BASE: u16 = 274;
pub const A_SACRIFICE_BASE: u16 = 284;
pub const A_CAST_FOR_IMPENDING: u16 = 294;
pub const A_PAY_OFFSPRING: u16 = 295;
pub const A_SEARCH_BASE: u16 = 299;
pub const A_SEARCH_FAIL: u16 = 304;
pub const A_PUT_TO_GRAVEYARD: u16 = 305;
pub const A_PUT_ON_TOP: u16 = 306;
pub const A_PUT_ON_BOTTOM: u16 = 307;
pub const A_DREDGE: u16 = 308;
pub const A_ADD_COUNTER_BASE: u16 = 314;
pub const A_REMOVE_COUNTER_BASE: u16 = 324;
pub const A_PROLIFERATE: u16 = 334;
pub const A_RETURN_GY_BASE: u16 = 335;
pub const A_REANIMATE_BASE: u16 = 341;
pub const A_RETURN_EXILE_BASE: u16 = 347;
pub const A_CHOOSE_MODE_BASE: u16 = 353;
pub const A_CHOOSE_X_BASE: u16 = 363;
pub const A_CHOOSE_COLOR_BASE: u16 = 373;
pub const A_ATTACK_PW_BASE: u16 = 378;
pub const A_MULTI_BLOCK_BASE: u16 = 383;
pub const A_GRAVE_CAST_BASE: u16 = 398;
pub const A_PAY_KICKER_YES: u16 = 405;
pub const A_PAY_KICKER_NO: u16 = 406;
pub const A_PAY_ADDITIONAL_YES: u16 = 407;
pub const A_PAY_ADDITIONAL_NO: u16 = 408;
pub const A_PAY_ESCALATE: u16 = 409;
pub const A_CREATE_TOKEN_BASE: u16 = 410;
pub const A_COPY_PERMANENT: u16 = 415;
pub const A_COPY_SPELL: u16 = 416;
pub const A_POPULATE: u16 = 417;
pub const A_MECHANIC_BASE: u16 = 418;
pub const A_RESPONSE_BASE: u16 = 430;
pub const A_COMBAT_SUB_BASE: u16 = 435;
pub const A_ATTACK_BATTLE_BASE: u16 = 462;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_index_decodes() {
        for i in 0..ACTION_SPACE as u16 {
            assert!(ActionKind::decode(i).is_some(), "index {i} must decode");
        }
        assert!(ActionKind::decode(480).is_none());
        assert!(ActionKind::decode(u16::MAX).is_none());
    }

    #[test]
    fn test_fixed_indices() {
        assert_eq!(ActionKind::decode(11), Some(ActionKind::PassPriority));
        assert_eq!(ActionKind::decode(12), Some(ActionKind::Concede));
        assert_eq!(ActionKind::decode(225), Some(ActionKind::KeepHand));
        assert_eq!(ActionKind::decode(5), Some(ActionKind::NoOp));
    }

    #[test]
    fn test_parameter_decoding() {
        assert_eq!(
            ActionKind::decode(13),
            Some(ActionKind::PlayLand { hand_idx: 0 })
        );
        assert_eq!(
            ActionKind::decode(19),
            Some(ActionKind::PlayLand { hand_idx: 6 })
        );
        assert_eq!(
            ActionKind::decode(47),
            Some(ActionKind::Attack {
                battlefield_idx: 19
            })
        );
        assert_eq!(
            ActionKind::decode(104),
            Some(ActionKind::ActivateAbility {
                battlefield_idx: 1,
                ability_idx: 1
            })
        );
        assert_eq!(ActionKind::decode(363), Some(ActionKind::ChooseX { x: 1 }));
        assert_eq!(ActionKind::decode(372), Some(ActionKind::ChooseX { x: 10 }));
        assert_eq!(
            ActionKind::decode(273),
            Some(ActionKind::SelectSpreeMode {
                hand_idx: 7,
                mode_idx: 1
            })
        );
    }

    #[test]
    fn test_mechanic_blocks() {
        assert_eq!(
            ActionKind::decode(205),
            Some(ActionKind::AltCast(AltMechanic::Disturb))
        );
        assert_eq!(
            ActionKind::decode(223),
            Some(ActionKind::AltCast(AltMechanic::Foretell))
        );
        assert_eq!(
            ActionKind::decode(398),
            Some(ActionKind::GraveCast(GraveCast::Flashback))
        );
        assert_eq!(
            ActionKind::decode(404),
            Some(ActionKind::GraveCast(GraveCast::Delve))
        );
        assert_eq!(
            ActionKind::decode(430),
            Some(ActionKind::Response(ResponseAction::CounterSpell))
        );
        assert_eq!(
            ActionKind::decode(444),
            Some(ActionKind::CombatSub(CombatSubAction::ProtectPlaneswalker))
        );
    }

    #[test]
    fn test_kicker_pair() {
        assert_eq!(
            ActionKind::decode(405),
            Some(ActionKind::PayKicker { pay: true })
        );
        assert_eq!(
            ActionKind::decode(406),
            Some(ActionKind::PayKicker { pay: false })
        );
    }

    #[test]
    fn test_reserved_blocks_are_noops() {
        for i in [224u16, 296, 297, 298, 309, 313, 393, 397, 451, 452, 459, 461, 467, 479] {
            assert_eq!(ActionKind::decode(i), Some(ActionKind::NoOp), "index {i}");
        }
    }
}
