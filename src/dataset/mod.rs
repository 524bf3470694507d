/// Training-set assembly from a [`CrimeGrid`](crate::data::model::CrimeGrid).
///
/// ```text
///   CrimeGrid ──► days ──► normalize ──► sequence ──► split
///              (optional)  (min-max)    (C / P / T)   (train / test)
/// ```

pub mod days;
pub mod normalize;
pub mod sequence;
pub mod split;
