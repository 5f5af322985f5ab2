pub const OSC_CLK: u32 = 24_000_000;

/// PLL output: (M_PLL + FRAC_N) * OSC_CLK / 4
///
/// 504 MHz: (84, 0)
///
/// 264 MHz: (44, 0)
pub const fn pll_freq(m_pll: u32, frac_n: u32) -> u32 {
    assert!(m_pll < 1 << 8);
    assert!(frac_n < 1 << 8);
    (m_pll + frac_n) * (OSC_CLK / 4)
}

/// cpu clock = PLL / DIV_CPU
pub const fn cpu_freq(pll: u32, div_cpu: u32) -> u32 {
    assert!(div_cpu != 0);
    assert!(div_cpu < 1 << 7);
    pll / div_cpu
}

/// The APB (and SPI input) clock follows the DDR divider: 0 => /2, 1 => /4, else /3
pub const fn apb_freq(cpu: u32, div_ddr: u32) -> u32 {
    match div_ddr {
        0 => cpu / 2,
        1 => cpu / 4,
        _ => cpu / 3,
    }
}

pub const PLL_CLK: u32 = pll_freq(84, 0);
pub const CPU_CLK: u32 = cpu_freq(PLL_CLK, 2);
pub const APB_CLK: u32 = apb_freq(CPU_CLK, 0);
