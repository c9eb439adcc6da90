//! Bundled per-VM persistent-disk caps.
//!
//! Figures are read IOPS, write IOPS, read MB/s, write MB/s.

use super::{DiskCaps, TierLimits};

type MachineTypeRow = (&'static str, &'static str, TierLimits);
type VcpuRow = (&'static str, u32, TierLimits);
type RangeRow = (&'static str, &'static str, TierLimits);

fn caps(read_iops: u32, write_iops: u32, read_mbps: u32, write_mbps: u32) -> Option<DiskCaps> {
    Some(DiskCaps::new(
        f64::from(read_iops),
        f64::from(write_iops),
        f64::from(read_mbps),
        f64::from(write_mbps),
    ))
}

fn tiers(
    standard: Option<DiskCaps>,
    balanced: Option<DiskCaps>,
    extreme: Option<DiskCaps>,
    ssd: Option<DiskCaps>,
) -> TierLimits {
    TierLimits {
        standard,
        balanced,
        extreme,
        ssd,
    }
}

/// General-purpose ladder shared by n1, n2 and n2d
fn general_purpose_ladder() -> Vec<(&'static str, TierLimits)> {
    vec![
        (
            "1",
            tiers(
                caps(3_000, 15_000, 204, 240),
                caps(15_000, 15_000, 204, 240),
                None,
                caps(15_000, 15_000, 204, 240),
            ),
        ),
        (
            "2-7",
            tiers(
                caps(3_000, 15_000, 240, 240),
                caps(15_000, 15_000, 240, 240),
                None,
                caps(15_000, 15_000, 240, 240),
            ),
        ),
        (
            "8-15",
            tiers(
                caps(5_000, 15_000, 800, 800),
                caps(15_000, 15_000, 800, 800),
                None,
                caps(15_000, 15_000, 800, 800),
            ),
        ),
        (
            "16-31",
            tiers(
                caps(7_500, 25_000, 1_200, 1_200),
                caps(20_000, 20_000, 1_200, 1_200),
                None,
                caps(25_000, 25_000, 1_200, 1_200),
            ),
        ),
        (
            "32-63",
            tiers(
                caps(7_500, 60_000, 1_200, 1_200),
                caps(50_000, 50_000, 1_200, 1_200),
                None,
                caps(60_000, 30_000, 1_200, 1_200),
            ),
        ),
        (
            "64-",
            tiers(
                caps(7_500, 60_000, 1_200, 1_200),
                caps(80_000, 80_000, 1_200, 1_200),
                None,
                caps(100_000, 30_000, 1_200, 1_200),
            ),
        ),
    ]
}

pub(super) fn vcpu_range_limits() -> Vec<RangeRow> {
    let mut rows = Vec::new();
    for family in ["n1", "n2", "n2d"] {
        rows.extend(
            general_purpose_ladder()
                .into_iter()
                .map(|(range, limits)| (family, range, limits)),
        );
    }

    rows.extend([
        (
            "e2",
            "2-7",
            tiers(
                caps(3_000, 15_000, 240, 240),
                caps(15_000, 15_000, 240, 240),
                None,
                caps(15_000, 15_000, 240, 240),
            ),
        ),
        (
            "e2",
            "8-15",
            tiers(
                caps(5_000, 15_000, 800, 800),
                caps(15_000, 15_000, 800, 800),
                None,
                caps(15_000, 15_000, 800, 800),
            ),
        ),
        (
            "e2",
            "16-31",
            tiers(
                caps(7_500, 25_000, 1_200, 1_200),
                caps(20_000, 20_000, 1_200, 1_200),
                None,
                caps(25_000, 25_000, 1_200, 1_200),
            ),
        ),
        (
            "e2",
            "32-",
            tiers(
                caps(7_500, 60_000, 1_200, 1_200),
                caps(50_000, 50_000, 1_200, 1_200),
                None,
                caps(60_000, 30_000, 1_200, 1_000),
            ),
        ),
    ]);

    for family in ["t2d", "t2a"] {
        rows.extend([
            (
                family,
                "1",
                tiers(
                    caps(1_000, 15_000, 204, 240),
                    caps(10_000, 10_000, 204, 240),
                    None,
                    caps(10_000, 10_000, 204, 240),
                ),
            ),
            (
                family,
                "2-7",
                tiers(
                    caps(3_000, 15_000, 240, 240),
                    caps(15_000, 15_000, 240, 240),
                    None,
                    caps(15_000, 15_000, 240, 240),
                ),
            ),
            (
                family,
                "8-15",
                tiers(
                    caps(5_000, 15_000, 800, 800),
                    caps(15_000, 15_000, 800, 800),
                    None,
                    caps(15_000, 15_000, 800, 800),
                ),
            ),
            (
                family,
                "16-31",
                tiers(
                    caps(7_500, 25_000, 1_200, 1_200),
                    caps(20_000, 20_000, 1_200, 1_200),
                    None,
                    caps(25_000, 25_000, 1_200, 1_200),
                ),
            ),
            (
                family,
                "32-",
                tiers(
                    caps(7_500, 60_000, 1_200, 1_200),
                    caps(50_000, 50_000, 1_200, 1_200),
                    None,
                    caps(60_000, 30_000, 1_200, 1_200),
                ),
            ),
        ]);
    }
    rows
}

pub(super) fn vcpu_limits() -> Vec<VcpuRow> {
    vec![
        // c2
        (
            "c2",
            4,
            tiers(
                caps(3_000, 4_000, 240, 240),
                caps(15_000, 15_000, 240, 240),
                None,
                caps(4_000, 4_000, 240, 240),
            ),
        ),
        (
            "c2",
            8,
            tiers(
                caps(3_000, 4_000, 240, 240),
                caps(15_000, 15_000, 800, 800),
                None,
                caps(4_000, 4_000, 240, 240),
            ),
        ),
        (
            "c2",
            16,
            tiers(
                caps(4_000, 4_000, 240, 240),
                caps(20_000, 20_000, 1_200, 1_200),
                None,
                caps(8_000, 4_000, 320, 240),
            ),
        ),
        (
            "c2",
            30,
            tiers(
                caps(8_000, 8_000, 240, 240),
                caps(50_000, 50_000, 1_200, 1_200),
                None,
                caps(15_000, 8_000, 600, 400),
            ),
        ),
        (
            "c2",
            60,
            tiers(
                caps(15_000, 15_000, 240, 240),
                caps(80_000, 80_000, 1_200, 1_200),
                None,
                caps(30_000, 15_000, 1_200, 800),
            ),
        ),
        // c2d
        (
            "c2d",
            2,
            tiers(
                caps(3_000, 4_590, 240, 240),
                caps(4_590, 4_590, 240, 240),
                None,
                caps(4_590, 4_590, 240, 240),
            ),
        ),
        (
            "c2d",
            4,
            tiers(
                caps(3_000, 4_590, 240, 240),
                caps(4_590, 4_590, 240, 240),
                None,
                caps(4_590, 4_590, 240, 240),
            ),
        ),
        (
            "c2d",
            8,
            tiers(
                caps(3_000, 4_590, 240, 240),
                caps(4_590, 4_590, 240, 240),
                None,
                caps(4_590, 4_590, 240, 240),
            ),
        ),
        (
            "c2d",
            16,
            tiers(
                caps(3_000, 4_590, 240, 240),
                caps(4_590, 8_000, 240, 240),
                None,
                caps(4_590, 8_000, 240, 240),
            ),
        ),
        (
            "c2d",
            32,
            tiers(
                caps(3_000, 8_000, 240, 240),
                caps(8_000, 15_000, 480, 480),
                None,
                caps(8_000, 15_000, 480, 480),
            ),
        ),
        (
            "c2d",
            56,
            tiers(
                caps(3_000, 8_000, 240, 240),
                caps(15_000, 30_000, 960, 960),
                None,
                caps(15_000, 30_000, 960, 960),
            ),
        ),
        (
            "c2d",
            112,
            tiers(
                caps(3_000, 8_000, 240, 240),
                caps(30_000, 30_000, 1_200, 1_200),
                None,
                caps(30_000, 30_000, 1_200, 1_200),
            ),
        ),
        // c3
        (
            "c3",
            4,
            tiers(
                caps(3_000, 15_000, 240, 240),
                caps(25_000, 25_000, 400, 400),
                None,
                caps(25_000, 25_000, 400, 400),
            ),
        ),
        (
            "c3",
            8,
            tiers(
                caps(5_000, 15_000, 800, 800),
                caps(25_000, 25_000, 800, 800),
                None,
                caps(25_000, 25_000, 800, 800),
            ),
        ),
        (
            "c3",
            22,
            tiers(
                caps(7_500, 25_000, 1_200, 1_200),
                caps(50_000, 50_000, 1_200, 1_200),
                None,
                caps(50_000, 50_000, 1_200, 1_200),
            ),
        ),
        (
            "c3",
            44,
            tiers(
                caps(7_500, 60_000, 1_200, 1_200),
                caps(80_000, 80_000, 1_200, 1_200),
                None,
                caps(80_000, 80_000, 1_200, 1_200),
            ),
        ),
        (
            "c3",
            88,
            tiers(
                caps(7_500, 60_000, 1_200, 1_200),
                caps(80_000, 80_000, 1_200, 1_200),
                caps(120_000, 120_000, 4_000, 4_000),
                caps(100_000, 80_000, 1_200, 1_200),
            ),
        ),
        (
            "c3",
            176,
            tiers(
                caps(7_500, 60_000, 1_200, 1_200),
                caps(80_000, 80_000, 1_200, 1_200),
                caps(120_000, 120_000, 4_000, 4_000),
                caps(100_000, 80_000, 1_200, 1_200),
            ),
        ),
    ]
}

pub(super) fn machine_type_limits() -> Vec<MachineTypeRow> {
    let mut rows = Vec::new();

    // e2 shared-core
    for machine_type in ["e2-micro", "e2-small", "e2-medium"] {
        rows.push((
            "e2",
            machine_type,
            tiers(
                caps(1_000, 10_000, 200, 200),
                caps(10_000, 10_000, 200, 200),
                None,
                caps(10_000, 10_000, 200, 200),
            ),
        ));
    }

    // n2: only PD-Extreme is taken from here
    let n2_extreme_64 = caps(120_000, 120_000, 3_000, 3_000);
    let n2_extreme_80 = caps(120_000, 120_000, 4_000, 4_000);
    for (machine_type, extreme) in [
        ("n2-standard-64", n2_extreme_64),
        ("n2-standard-80", n2_extreme_80),
        ("n2-standard-96", n2_extreme_80),
        ("n2-standard-128", n2_extreme_80),
        ("n2-highmem-64", n2_extreme_64),
        ("n2-highmem-80", n2_extreme_80),
        ("n2-highmem-96", n2_extreme_80),
        ("n2-highmem-128", n2_extreme_80),
        ("n2-highcpu-64", n2_extreme_64),
        ("n2-highcpu-80", n2_extreme_80),
        ("n2-highcpu-96", n2_extreme_80),
    ] {
        rows.push(("n2", machine_type, tiers(None, None, extreme, None)));
    }

    // memory-optimized
    rows.extend([
        (
            "m1",
            "m1-ultramem-40",
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(60_000, 60_000, 1_200, 1_200),
                None,
                caps(60_000, 60_000, 1_200, 1_200),
            ),
        ),
        (
            "m1",
            "m1-ultramem-80",
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(70_000, 70_000, 1_200, 1_200),
                caps(70_000, 70_000, 2_200, 2_200),
                caps(70_000, 70_000, 1_200, 1_200),
            ),
        ),
        (
            "m1",
            "m1-megamem-96",
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(80_000, 80_000, 1_200, 1_200),
                caps(90_000, 90_000, 2_200, 2_200),
                caps(90_000, 90_000, 1_200, 1_200),
            ),
        ),
        (
            "m1",
            "m1-ultramem-160",
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(70_000, 70_000, 1_200, 1_200),
                caps(70_000, 70_000, 2_200, 2_200),
                caps(70_000, 70_000, 1_200, 1_200),
            ),
        ),
    ]);

    for machine_type in [
        "m2-megamem-416",
        "m2-ultramem-208",
        "m2-ultramem-416",
        "m2-hypermem-416",
    ] {
        rows.push((
            "m2",
            machine_type,
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(40_000, 40_000, 1_200, 1_200),
                caps(40_000, 40_000, 3_000, 2_200),
                caps(40_000, 40_000, 1_200, 1_200),
            ),
        ));
    }

    rows.extend([
        (
            "m3",
            "m3-ultramem-32",
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(40_000, 40_000, 1_200, 1_200),
                None,
                caps(40_000, 40_000, 1_200, 1_200),
            ),
        ),
        (
            "m3",
            "m3-megamem-64",
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(40_000, 40_000, 1_200, 1_200),
                caps(40_000, 40_000, 2_200, 2_200),
                caps(40_000, 40_000, 1_200, 1_200),
            ),
        ),
        (
            "m3",
            "m3-ultramem-64",
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(40_000, 40_000, 1_200, 1_200),
                caps(40_000, 40_000, 2_200, 2_200),
                caps(40_000, 40_000, 1_200, 1_200),
            ),
        ),
        (
            "m3",
            "m3-megamem-128",
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(80_000, 80_000, 1_200, 1_200),
                caps(80_000, 80_000, 2_200, 2_200),
                caps(80_000, 80_000, 1_200, 1_200),
            ),
        ),
        (
            "m3",
            "m3-ultramem-128",
            tiers(
                caps(7_500, 15_000, 1_200, 400),
                caps(80_000, 80_000, 1_200, 1_200),
                caps(80_000, 80_000, 2_200, 2_200),
                caps(80_000, 80_000, 1_200, 1_200),
            ),
        ),
    ]);

    // accelerator-optimized
    let a2_small = tiers(
        caps(5_000, 15_000, 800, 800),
        caps(15_000, 15_000, 800, 800),
        None,
        caps(15_000, 15_000, 800, 800),
    );
    let a2_medium = tiers(
        caps(7_500, 25_000, 1_200, 1_200),
        caps(20_000, 20_000, 1_200, 1_200),
        None,
        caps(25_000, 25_000, 1_200, 1_200),
    );
    let a2_large = tiers(
        caps(7_500, 60_000, 1_200, 1_200),
        caps(50_000, 50_000, 1_200, 1_200),
        None,
        caps(60_000, 30_000, 1_200, 1_200),
    );
    let a2_xlarge = tiers(
        caps(7_500, 60_000, 1_200, 1_200),
        caps(80_000, 80_000, 1_200, 1_200),
        None,
        caps(100_000, 30_000, 1_200, 1_200),
    );
    rows.extend([
        ("a2", "a2-highgpu-1g", a2_small),
        ("a2", "a2-highgpu-2g", a2_medium),
        ("a2", "a2-highgpu-4g", a2_large),
        ("a2", "a2-highgpu-8g", a2_xlarge),
        ("a2", "a2-megagpu-16g", a2_xlarge),
        ("a2", "a2-ultragpu-1g", a2_small),
        ("a2", "a2-ultragpu-2g", a2_medium),
        ("a2", "a2-ultragpu-4g", a2_large),
        ("a2", "a2-ultragpu-8g", a2_xlarge),
    ]);

    let g2_small = tiers(
        caps(3_000, 15_000, 240, 240),
        caps(15_000, 15_000, 240, 240),
        None,
        caps(15_000, 15_000, 240, 240),
    );
    let g2_medium = tiers(
        caps(5_000, 15_000, 800, 800),
        caps(15_000, 15_000, 800, 800),
        None,
        caps(15_000, 15_000, 800, 800),
    );
    let g2_large = tiers(
        caps(7_500, 25_000, 1_200, 1_200),
        caps(20_000, 20_000, 1_200, 1_200),
        None,
        caps(25_000, 25_000, 1_200, 1_200),
    );
    let g2_xlarge = tiers(
        caps(7_500, 60_000, 1_200, 1_200),
        caps(50_000, 50_000, 1_200, 1_200),
        None,
        caps(60_000, 30_000, 1_200, 1_200),
    );
    rows.extend([
        ("g2", "g2-standard-4", g2_small),
        ("g2", "g2-standard-8", g2_medium),
        ("g2", "g2-standard-12", g2_medium),
        ("g2", "g2-standard-16", g2_large),
        ("g2", "g2-standard-24", g2_large),
        ("g2", "g2-standard-32", g2_xlarge),
        ("g2", "g2-standard-48", g2_xlarge),
        ("g2", "g2-standard-96", g2_xlarge),
    ]);

    rows
}
