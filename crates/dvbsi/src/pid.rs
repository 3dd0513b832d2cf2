//! PID関連。

use std::fmt;
use std::ops;

use crate::bytes::BytesExt;

/// MPEG2-TSのPID（13ビット）。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u16);

// 定数のほとんどはETSI EN 300 468およびATSC A/65による。
impl Pid {
    /// PIDの最大値。
    pub const MAX: u16 = 0x1FFF;

    /// PAT（Program Association Table）。
    pub const PAT: Pid = Pid(0x0000);
    /// CAT（Conditional Access Table）。
    pub const CAT: Pid = Pid(0x0001);
    /// NIT（Network Information Table）。
    pub const NIT: Pid = Pid(0x0010);
    /// SDTとBATが共有するPID。
    pub const SDT: Pid = Pid(0x0011);
    /// BAT（Bouquet Association Table）。[`Pid::SDT`]と同じ。
    pub const BAT: Pid = Pid::SDT;
    /// EIT（Event Information Table）。
    pub const EIT: Pid = Pid(0x0012);
    /// RST（Running Status Table）。
    pub const RST: Pid = Pid(0x0013);
    /// TDTとTOTが共有するPID。
    pub const TDT: Pid = Pid(0x0014);
    /// TOT（Time Offset Table）。[`Pid::TDT`]と同じ。
    pub const TOT: Pid = Pid::TDT;
    /// SIT（Selection Information Table）。
    pub const SIT: Pid = Pid(0x001F);

    /// 事業者形式のEITが送られるPID。
    pub const DISH_EIT: Pid = Pid(0x0300);
    /// 事業者形式の拡張EITが送られるPID。
    pub const DISH_EIT_EXTENDED: Pid = Pid(0x0441);

    /// ATSC PSIPのベースPID。
    pub const PSIP: Pid = Pid(0x1FFB);
    /// ヌルパケット。
    pub const NULL: Pid = Pid(0x1FFF);

    /// `Pid`を生成する。
    ///
    /// # パニック
    ///
    /// `pid`が13ビットに収まらない場合はパニックする。
    #[inline]
    pub const fn new(pid: u16) -> Pid {
        match Pid::try_new(pid) {
            Some(pid) => pid,
            None => panic!("PIDが範囲外"),
        }
    }

    /// `pid`が13ビットに収まれば`Pid`を生成する。
    #[inline]
    pub const fn try_new(pid: u16) -> Option<Pid> {
        if pid <= Pid::MAX {
            Some(Pid(pid))
        } else {
            None
        }
    }

    /// 先頭2バイトの下位13ビットからPIDを読み出す。
    ///
    /// # パニック
    ///
    /// `data`が2バイト未満の場合はパニックする。
    #[inline]
    pub fn read(data: &[u8]) -> Pid {
        Pid(data[..2].read_be_16() & Pid::MAX)
    }

    /// PIDの値。
    #[inline]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl Default for Pid {
    #[inline]
    fn default() -> Pid {
        Pid::NULL
    }
}

impl From<Pid> for u16 {
    #[inline]
    fn from(pid: Pid) -> u16 {
        pid.0
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pid(0x{:04X})", self.0)
    }
}

macro_rules! impl_fmt {
    ($($trait:ident),*) => {$(
        impl fmt::$trait for Pid {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::$trait::fmt(&self.0, f)
            }
        }
    )*};
}

impl_fmt!(Display, LowerHex, UpperHex);

/// [`Pid`]ごとに値`V`を持つ表。
///
/// 全PID分の領域をヒープに確保する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidTable<V>(Box<[V]>);

impl<V> PidTable<V> {
    /// PIDごとに`f`を呼び出して表を生成する。
    pub fn from_fn<F: FnMut(Pid) -> V>(mut f: F) -> PidTable<V> {
        PidTable((0..=Pid::MAX).map(|pid| f(Pid(pid))).collect())
    }

    /// PIDと値の組を順に返す。
    pub fn iter(&self) -> impl Iterator<Item = (Pid, &V)> {
        (0..=Pid::MAX).map(Pid).zip(self.0.iter())
    }

    /// PIDと値の可変参照の組を順に返す。
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Pid, &mut V)> {
        (0..=Pid::MAX).map(Pid).zip(self.0.iter_mut())
    }
}

impl<V> ops::Index<Pid> for PidTable<V> {
    type Output = V;

    #[inline]
    fn index(&self, pid: Pid) -> &V {
        &self.0[usize::from(pid.0)]
    }
}

impl<V> ops::IndexMut<Pid> for PidTable<V> {
    #[inline]
    fn index_mut(&mut self, pid: Pid) -> &mut V {
        &mut self.0[usize::from(pid.0)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid() {
        assert_eq!(Pid::new(0x1FFF), Pid::NULL);
        std::panic::catch_unwind(|| Pid::new(0x2000)).unwrap_err();
        assert_eq!(Pid::try_new(0x1FFB), Some(Pid::PSIP));
        assert_eq!(Pid::try_new(0x2000), None);

        std::panic::catch_unwind(|| Pid::read(&[0x00])).unwrap_err();
        assert_eq!(Pid::read(&u16::to_be_bytes(0x0300)), Pid::DISH_EIT);
        assert_eq!(Pid::read(&u16::to_be_bytes(0xE012)), Pid::EIT);

        assert_eq!(Pid::default(), Pid::NULL);
        assert_eq!(Pid::SDT, Pid::BAT);
        assert_eq!(u16::from(Pid::TOT), 0x0014);

        assert_eq!(format!("{}", Pid::EIT), "18");
        assert_eq!(format!("{:04X}", Pid::DISH_EIT_EXTENDED), "0441");
        assert_eq!(format!("{:?}", Pid::NULL), "Pid(0x1FFF)");
    }

    #[test]
    fn test_pid_table() {
        let mut table = PidTable::from_fn(|pid| pid.get() as u32);
        assert_eq!(table[Pid::NIT], 0x10);
        assert_eq!(table.iter().count(), 0x2000);

        table[Pid::PSIP] = 0;
        assert_eq!(table.iter().filter(|(_, v)| **v == 0).count(), 2);

        for (pid, v) in table.iter_mut() {
            *v = pid.get() as u32 * 2;
        }
        assert_eq!(table[Pid::EIT], 0x24);
    }
}
